use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use uuid::Uuid;

/// Prefix of in-flight uploads inside the upload directory
const STAGING_PREFIX: &str = ".staging-";

/// A fully written upload that has not been given its final name yet
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// An opened stored file ready to be streamed
#[derive(Debug)]
pub struct StoredFile {
    pub file: fs::File,
    pub size: u64,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the storage root if it does not exist
    async fn ensure_root(&self) -> Result<()>;

    /// Streams `reader` into a new staging file, stopping once more than
    /// `max_size` bytes have been read.
    async fn stage<'a>(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        max_size: u64,
    ) -> Result<StagedFile>;

    /// Moves a staged file to `filename`, replacing any existing file
    async fn commit(&self, staged: StagedFile, filename: &str) -> Result<()>;

    /// Removes a staged file that will not be committed
    async fn discard(&self, staged: StagedFile) -> Result<()>;

    /// Opens a stored file; `None` when it does not exist
    async fn open(&self, filename: &str) -> Result<Option<StoredFile>>;
}

/// Raised by [`StorageService::stage`] when the stream exceeds the limit
#[derive(Debug, thiserror::Error)]
#[error("upload exceeds {limit} bytes")]
pub struct SizeLimitExceeded {
    pub limit: u64,
}

/// Stores uploads as flat files in a single directory
#[derive(Debug, Clone)]
pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a stored name to its path, refusing anything that could
    /// escape the root or collide with staging files.
    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
            || filename.starts_with(STAGING_PREFIX)
        {
            return Err(anyhow!("Refusing unsafe storage name: {:?}", filename));
        }
        Ok(self.root.join(filename))
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn stage<'a>(
        &self,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        max_size: u64,
    ) -> Result<StagedFile> {
        let path = self
            .root
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));

        let file = fs::File::create(&path).await?;
        let mut writer = BufWriter::new(file);

        // One byte past the limit is enough to detect an oversized stream.
        let mut limited = tokio::io::AsyncReadExt::take(&mut reader, max_size.saturating_add(1));
        let copied = match tokio::io::copy(&mut limited, &mut writer).await {
            Ok(n) => n,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(&path).await;
                return Err(e.into());
            }
        };

        if copied > max_size {
            drop(writer);
            let _ = fs::remove_file(&path).await;
            return Err(SizeLimitExceeded { limit: max_size }.into());
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        Ok(StagedFile { path, size: copied })
    }

    async fn commit(&self, staged: StagedFile, filename: &str) -> Result<()> {
        let target = match self.resolve(filename) {
            Ok(target) => target,
            Err(e) => {
                let _ = fs::remove_file(&staged.path).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&staged.path, &target).await {
            let _ = fs::remove_file(&staged.path).await;
            return Err(anyhow!("Failed to move upload into place as {:?}: {}", filename, e));
        }
        Ok(())
    }

    async fn discard(&self, staged: StagedFile) -> Result<()> {
        match fs::remove_file(&staged.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, filename: &str) -> Result<Option<StoredFile>> {
        let path = self.resolve(filename)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok(Some(StoredFile { file, size }))
    }
}

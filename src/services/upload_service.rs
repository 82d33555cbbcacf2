use crate::config::AppConfig;
use crate::services::qr::QrRenderer;
use crate::services::registry::{UploadRecord, UploadRegistry, Verification};
use crate::services::storage::{SizeLimitExceeded, StagedFile, StorageService, StoredFile};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::{ValidationError, content_type_for, validate_upload_name};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use url::Url;

/// User-correctable reasons an upload is refused. The display text is what
/// the upload form shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("No file part in the request")]
    NoFilePart,
    #[error("No file selected")]
    NoFileSelected,
    #[error("File type not allowed")]
    ExtensionNotAllowed,
    #[error("Invalid filename")]
    InvalidFilename,
    #[error("A password is required")]
    MissingPassword,
    #[error("File is too large")]
    TooLarge,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Rejected(#[from] UploadRejection),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A committed upload and the QR code pointing at it
#[derive(Debug)]
pub struct UploadOutcome {
    pub record: UploadRecord,
    pub url: Url,
    pub qr_png: Vec<u8>,
    /// An earlier upload with the same name was overwritten
    pub replaced: bool,
}

#[derive(Debug)]
pub enum Retrieval {
    Granted {
        record: UploadRecord,
        file: StoredFile,
    },
    Denied,
    NotFound,
}

pub struct UploadService {
    storage: Arc<dyn StorageService>,
    registry: Arc<UploadRegistry>,
    renderer: QrRenderer,
    locks: KeyedMutex,
    config: AppConfig,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn StorageService>,
        registry: Arc<UploadRegistry>,
        config: AppConfig,
    ) -> Self {
        Self {
            storage,
            registry,
            renderer: QrRenderer::from_config(&config),
            locks: KeyedMutex::new(),
            config,
        }
    }

    pub fn registry(&self) -> &UploadRegistry {
        &self.registry
    }

    /// Validates a client supplied filename and returns the name it will be
    /// stored under. Runs before any bytes are written.
    pub fn check_filename(&self, original: &str) -> Result<String, UploadRejection> {
        validate_upload_name(original, self.config.allowed_extensions.as_slice()).map_err(|e| {
            match e.downcast_ref::<ValidationError>().map(|v| v.code) {
                Some("EMPTY_FILENAME") => UploadRejection::NoFileSelected,
                Some("EXTENSION_NOT_ALLOWED") => UploadRejection::ExtensionNotAllowed,
                _ => UploadRejection::InvalidFilename,
            }
        })
    }

    /// Streams an upload body into staging, enforcing the size limit
    pub async fn stage<'a>(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StagedFile, UploadError> {
        self.storage
            .stage(reader, self.config.max_file_size as u64)
            .await
            .map_err(|e| {
                if e.downcast_ref::<SizeLimitExceeded>().is_some() {
                    UploadError::Rejected(UploadRejection::TooLarge)
                } else {
                    UploadError::Internal(e)
                }
            })
    }

    /// Drops a staged upload, logging instead of failing
    pub async fn discard(&self, staged: StagedFile) {
        let path = staged.path.clone();
        if let Err(e) = self.storage.discard(staged).await {
            tracing::warn!("Failed to remove staging file {:?}: {}", path, e);
        }
    }

    /// Publishes a staged upload under `filename`, records its password and
    /// renders the QR code for its retrieval URL.
    pub async fn finish(
        &self,
        staged: StagedFile,
        filename: &str,
        password: &str,
    ) -> Result<UploadOutcome, UploadError> {
        if password.is_empty() {
            self.discard(staged).await;
            return Err(UploadRejection::MissingPassword.into());
        }

        let outcome = self.prepare_outcome(filename, password, staged.size).await;
        let (record, url, qr_png) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                self.discard(staged).await;
                return Err(e.into());
            }
        };

        let replaced = {
            let _guard = self.locks.lock(filename).await;
            self.storage.commit(staged, filename).await?;
            self.registry.insert(record.clone()).is_some()
        };

        tracing::info!(
            "📦 Stored upload filename={} size={} replaced={}",
            record.filename,
            record.size,
            replaced
        );

        Ok(UploadOutcome {
            record,
            url,
            qr_png,
            replaced,
        })
    }

    /// Work that does not touch shared state: hashing, URL and QR rendering
    async fn prepare_outcome(
        &self,
        filename: &str,
        password: &str,
        size: u64,
    ) -> Result<(UploadRecord, Url, Vec<u8>)> {
        let record =
            UploadRegistry::prepare(filename, password, size, content_type_for(filename)).await?;
        let url = self.retrieval_url(filename)?;
        let qr_png = self.renderer.render_png(url.as_str())?;
        Ok((record, url, qr_png))
    }

    /// `<public base>/password/<filename>`
    pub fn retrieval_url(&self, filename: &str) -> Result<Url> {
        let mut url = self.config.public_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Public base URL cannot be a base"))?
            .pop_if_empty()
            .push("password")
            .push(filename);
        Ok(url)
    }

    /// Checks `password` for `file_id` and opens the file when it matches
    pub async fn retrieve(&self, file_id: &str, password: &str) -> Result<Retrieval> {
        if !self.is_known(file_id) {
            return Ok(Retrieval::NotFound);
        }
        let _guard = self.locks.lock(file_id).await;

        match self.registry.verify(file_id, password).await? {
            Verification::Unknown => Ok(Retrieval::NotFound),
            Verification::Denied => Ok(Retrieval::Denied),
            Verification::Granted(record) => match self.storage.open(&record.filename).await? {
                Some(file) => Ok(Retrieval::Granted { record, file }),
                None => {
                    tracing::warn!(
                        "Upload record for {} exists but the file is gone",
                        record.filename
                    );
                    Ok(Retrieval::NotFound)
                }
            },
        }
    }

    /// True when a record exists for `file_id`
    pub fn is_known(&self, file_id: &str) -> bool {
        self.registry.get(file_id).is_some()
    }
}

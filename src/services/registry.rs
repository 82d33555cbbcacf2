use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mime::Mime;

/// Association between a stored filename and the secret that unlocks it
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub filename: String,
    /// Argon2 PHC string; the plaintext password is never kept
    pub password_hash: String,
    pub size: u64,
    pub content_type: Mime,
    pub uploaded_at: DateTime<Utc>,
}

/// Outcome of checking a password guess
#[derive(Debug, Clone)]
pub enum Verification {
    Granted(UploadRecord),
    Denied,
    Unknown,
}

/// In-memory table of upload records keyed by filename.
///
/// Records are never evicted. Callers that must keep the record and the file
/// on disk consistent hold the filename's lock in [`crate::utils::keyed_mutex`]
/// around the file commit and [`UploadRegistry::insert`].
#[derive(Debug, Default)]
pub struct UploadRegistry {
    records: DashMap<String, UploadRecord>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a password using argon2 with a fresh random salt
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| anyhow!("Corrupt password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Builds a record for `filename`, hashing `password` off the async runtime.
    pub async fn prepare(
        filename: &str,
        password: &str,
        size: u64,
        content_type: Mime,
    ) -> Result<UploadRecord> {
        let password = password.to_string();
        let password_hash =
            tokio::task::spawn_blocking(move || Self::hash_password(&password)).await??;

        Ok(UploadRecord {
            filename: filename.to_string(),
            password_hash,
            size,
            content_type,
            uploaded_at: Utc::now(),
        })
    }

    /// Inserts a record, replacing any previous upload of the same name.
    /// Returns the replaced record.
    pub fn insert(&self, record: UploadRecord) -> Option<UploadRecord> {
        self.records.insert(record.filename.clone(), record)
    }

    pub fn get(&self, filename: &str) -> Option<UploadRecord> {
        self.records.get(filename).map(|r| r.value().clone())
    }

    /// Checks a password guess for `filename`
    pub async fn verify(&self, filename: &str, password: &str) -> Result<Verification> {
        let Some(record) = self.get(filename) else {
            return Ok(Verification::Unknown);
        };

        let guess = password.to_string();
        let hash = record.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || Self::verify_password(&guess, &hash)).await??;

        if matches {
            Ok(Verification::Granted(record))
        } else {
            Ok(Verification::Denied)
        }
    }

    /// Number of uploads currently retrievable
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

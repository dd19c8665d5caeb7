use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Seconds a pre-signed URL stays valid.
const PRESIGN_EXPIRY_SECS: u32 = 900;

/// Client for the S3-compatible bucket holding submitted assets.
///
/// Testers upload directly against pre-signed URLs; the server only reads
/// asset bytes back when computing perceptual hashes.
pub struct StorageClient {
    bucket: Box<Bucket>,
}

impl StorageClient {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    /// Pre-signed URL a client can PUT an asset to.
    pub async fn signed_upload_url(&self, key: &str) -> Result<String, StorageError> {
        self.bucket
            .presign_put(key, PRESIGN_EXPIRY_SECS, None, None)
            .await
            .map_err(StorageError::S3)
    }

    /// Pre-signed URL an operator can GET an asset from.
    pub async fn signed_download_url(&self, key: &str) -> Result<String, StorageError> {
        self.bucket
            .presign_get(key, PRESIGN_EXPIRY_SECS, None)
            .await
            .map_err(StorageError::S3)
    }

    /// Fetch asset bytes for hashing.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("storage configuration error: {0}")]
    Config(String),
}

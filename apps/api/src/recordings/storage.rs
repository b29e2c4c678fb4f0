//! S3-compatible object storage for interview recordings.

use std::time::Duration;

use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::errors::AppError;

pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

/// Where objects are reachable when the bucket is public: path-style under a
/// custom endpoint (MinIO), virtual-hosted style on AWS.
pub fn public_base_url(config: &StorageConfig) -> String {
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
    }
}

/// `recordings/<user>/<interview>-<timestamp>.<ext>`
pub fn recording_key(user_id: Uuid, interview_id: Uuid, extension: &str, now: DateTime<Utc>) -> String {
    format!(
        "recordings/{user_id}/{interview_id}-{}.{}",
        now.format("%Y%m%dT%H%M%S"),
        extension.trim_start_matches('.').to_ascii_lowercase()
    )
}

impl ObjectStorage {
    /// Builds a client for MinIO (custom endpoint, path-style) or AWS.
    pub async fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "jobprep-static",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_base: public_base_url(config),
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    pub async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, AppError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;
        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(self.object_url(key))
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;
        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }

    /// Time-limited GET link, for buckets that are not public.
    pub async fn presigned_get(&self, key: &str) -> Result<String, AppError> {
        let presigning = PresigningConfig::expires_in(DOWNLOAD_URL_TTL)
            .map_err(|e| AppError::Storage(format!("Invalid presign config: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Storage(format!("S3 presign failed: {e}")))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(endpoint: Option<&str>) -> StorageConfig {
        StorageConfig {
            bucket: "jobprep".into(),
            endpoint: endpoint.map(str::to_string),
            region: "eu-west-1".into(),
            access_key_id: "minio".into(),
            secret_access_key: "minio123".into(),
        }
    }

    #[test]
    fn test_public_base_url() {
        assert_eq!(
            public_base_url(&config(Some("http://localhost:9000/"))),
            "http://localhost:9000/jobprep"
        );
        assert_eq!(
            public_base_url(&config(None)),
            "https://jobprep.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_recording_key() {
        let user = Uuid::nil();
        let interview = Uuid::from_u128(1);
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        assert_eq!(
            recording_key(user, interview, ".WEBM", now),
            format!("recordings/{user}/{interview}-20260504T093000.webm")
        );
    }

    #[tokio::test]
    async fn test_object_url_uses_bucket_base() {
        let storage = ObjectStorage::new(&config(Some("http://localhost:9000"))).await;
        assert_eq!(
            storage.object_url("recordings/a.webm"),
            "http://localhost:9000/jobprep/recordings/a.webm"
        );
    }
}

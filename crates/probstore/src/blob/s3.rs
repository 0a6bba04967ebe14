use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;

use probstore_core::storage::{BlobStore, RepositoryError, Result};

use crate::config::Config;

/// Blob store backed by a single S3 bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BlobStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3BlobStore {
    /// Creates a store from the shared SDK configuration.
    ///
    /// An endpoint override (LocalStack, MinIO) switches to path-style
    /// addressing.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: &Config) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config)
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .retry_config(RetryConfig::standard().with_max_attempts(1))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.timeout())
                    .build(),
            );

        if let Some(endpoint) = &config.blob_endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::from_client(Client::from_conf(builder.build()), config.blob_bucket.clone())
    }

    /// Creates a store from a pre-built client (for testing).
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Map an S3 SDK error to RepositoryError.
///
/// Throttling, 5xx responses, timeouts and dispatch failures are transient.
fn map_s3_error<E: std::fmt::Debug>(
    err: SdkError<E>,
    operation: &str,
    key: &str,
) -> RepositoryError {
    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            match status {
                429 | 500 | 502 | 503 | 504 => RepositoryError::Transient(format!(
                    "{} on '{}' failed (HTTP {})",
                    operation, key, status
                )),
                401 | 403 => RepositoryError::ConnectionFailed(format!(
                    "Access denied for blob '{}' (HTTP {})",
                    key, status
                )),
                _ => RepositoryError::QueryFailed(format!(
                    "{} on '{}' failed (HTTP {}): {:?}",
                    operation, key, status, err
                )),
            }
        }
        SdkError::TimeoutError(_) => {
            RepositoryError::Transient(format!("{} on '{}' timed out", operation, key))
        }
        SdkError::DispatchFailure(_) => RepositoryError::Transient(format!(
            "{} on '{}' connection error: {:?}",
            operation, key, err
        )),
        _ => RepositoryError::QueryFailed(format!("{} on '{}' failed: {:?}", operation, key, err)),
    }
}

fn is_missing_object(err: &SdkError<GetObjectError>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => {
            matches!(service_err.err(), GetObjectError::NoSuchKey(_))
                || service_err.raw().status().as_u16() == 404
        }
        _ => false,
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_encoding: Option<&str>,
    ) -> Result<()> {
        tracing::debug!(bucket = %self.bucket, key, bytes = body.len(), "Writing blob");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .set_content_encoding(content_encoding.map(str::to_string))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_s3_error(e, "PutObject", key))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_missing_object(&e) => return Ok(None),
            Err(e) => return Err(map_s3_error(e, "GetObject", key)),
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| {
                RepositoryError::Transient(format!("Failed to read blob '{}': {}", key, e))
            })?
            .into_bytes()
            .to_vec();

        Ok(Some(bytes))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, "DeleteObject", key))?;

        Ok(())
    }
}

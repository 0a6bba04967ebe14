use std::{env, time::Duration};

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// DynamoDB table holding every entity (default: "probstore")
    pub table_name: String,
    /// AWS region (default: "us-east-1")
    pub region: String,
    /// DynamoDB endpoint override, e.g. DynamoDB Local
    pub endpoint_url: Option<String>,
    /// Bucket for tiered payloads (default: "probstore-blobs")
    pub blob_bucket: String,
    /// S3 endpoint override, e.g. LocalStack or MinIO
    pub blob_endpoint_url: Option<String>,
    /// Per-operation timeout in milliseconds (default: 10,000)
    pub timeout_ms: u64,
    /// Minutes after which a `PROCESSING` job counts as stale (default: 30)
    pub stale_job_minutes: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DYNAMODB_TABLE_NAME` - Table name (default: "probstore")
    /// - `AWS_REGION` - Region (default: "us-east-1")
    /// - `AWS_ENDPOINT_URL` - Optional DynamoDB endpoint override
    /// - `BLOB_BUCKET` - Blob bucket (default: "probstore-blobs")
    /// - `BLOB_ENDPOINT_URL` - Optional S3 endpoint override
    /// - `STORAGE_TIMEOUT_MS` - Operation timeout (default: 10,000)
    /// - `STALE_JOB_MINUTES` - Stale job window (default: 30)
    pub fn from_env() -> Self {
        Self {
            table_name: env::var("DYNAMODB_TABLE_NAME").unwrap_or_else(|_| "probstore".to_string()),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: env::var("AWS_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),
            blob_bucket: env::var("BLOB_BUCKET").unwrap_or_else(|_| "probstore-blobs".to_string()),
            blob_endpoint_url: env::var("BLOB_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),
            timeout_ms: env::var("STORAGE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            stale_job_minutes: env::var("STALE_JOB_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Get the operation timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the stale job window in seconds.
    pub fn stale_after_secs(&self) -> i64 {
        self.stale_job_minutes * 60
    }

    /// Loads the shared AWS SDK configuration for the configured region.
    ///
    /// Credentials come from the default provider chain.
    pub async fn sdk_config(&self) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .load()
            .await
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            table_name: "t".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: None,
            blob_bucket: "b".to_string(),
            blob_endpoint_url: None,
            timeout_ms: 2_500,
            stale_job_minutes: 15,
        }
    }

    #[test]
    fn test_duration_conversions() {
        let config = sample();
        assert_eq!(config.timeout(), Duration::from_millis(2_500));
        assert_eq!(config.stale_after_secs(), 900);
    }

    #[test]
    fn test_default_values() {
        // Clear environment variables to test defaults
        for var in [
            "DYNAMODB_TABLE_NAME",
            "AWS_REGION",
            "AWS_ENDPOINT_URL",
            "BLOB_BUCKET",
            "BLOB_ENDPOINT_URL",
            "STORAGE_TIMEOUT_MS",
            "STALE_JOB_MINUTES",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env();

        assert_eq!(config.table_name, "probstore");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.endpoint_url, None);
        assert_eq!(config.blob_bucket, "probstore-blobs");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.stale_job_minutes, 30);
    }
}

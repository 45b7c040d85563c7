//! [`ObjectStore`] backed by `aws-sdk-s3`.

use std::path::Path;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::primitives::ByteStream;

use crate::{ListPage, ObjectStore, StoreConfig, StoreError};

/// S3 (or S3-compatible) bucket client.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Builds a client from validated configuration.
    ///
    /// Uses static credentials from the configuration rather than the AWS
    /// default provider chain. A custom endpoint switches to path-style
    /// addressing.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        let creds = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "s3-uploads-env",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let output = request.send().await.map_err(|e| StoreError::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            source: Box::new(e),
        })?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();

        let next_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }

    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StoreError> {
        // Streams from disk; the file handle is owned by the body and closed
        // when the request completes or fails.
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| StoreError::Read {
                path: source.display().to_string(),
                source: Box::new(e),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }
}

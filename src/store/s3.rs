//! AWS S3 object store backend.
//!
//! One `PutObject` per file; URLs use the virtual-hosted-style address of
//! the bucket, or path-style under a custom endpoint (MinIO, LocalStack).

use super::{ObjectPayload, ObjectStore, ObjectStoreError, ObjectStoreResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

#[derive(Clone, Debug)]
pub struct S3Store {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Store {
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        force_path_style: bool,
    ) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&aws_config);
        if let Some(ref endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = S3Client::from_conf(builder.build());

        info!(bucket = %bucket, region = %region, "S3 object store initialized");

        Self {
            client,
            bucket,
            region,
            endpoint_url,
        }
    }

    /// Public URL for `key`: path-style under a custom endpoint, otherwise
    /// the bucket's virtual-hosted S3 address.
    fn object_url(&self, key: &str) -> String {
        let encoded = urlencoding::encode(key);
        match &self.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                encoded
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        key: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ObjectStoreResult<String> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body));
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        req.send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;

        Ok(self.object_url(key))
    }

    async fn get_object(&self, key: &str) -> ObjectStoreResult<ObjectPayload> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    ObjectStoreError::Backend(service.to_string())
                }
            })?;

        let len = out.content_length().and_then(|l| u64::try_from(l).ok());
        Ok(ObjectPayload {
            len,
            reader: Box::pin(out.body.into_async_read()),
        })
    }

    async fn check_ready(&self) -> ObjectStoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(endpoint: Option<&str>, path_style: bool) -> S3Store {
        S3Store::new(
            "drive-bucket".into(),
            "us-east-1".into(),
            endpoint.map(String::from),
            path_style,
        )
        .await
    }

    #[tokio::test]
    async fn virtual_hosted_url_without_endpoint() {
        let store = store(None, false).await;
        assert_eq!(
            store.object_url("1-photo.png"),
            "https://drive-bucket.s3.us-east-1.amazonaws.com/1-photo.png"
        );
    }

    #[tokio::test]
    async fn path_style_url_with_custom_endpoint() {
        let store = store(Some("http://localhost:9000/"), true).await;
        assert_eq!(
            store.object_url("1-my file.txt"),
            "http://localhost:9000/drive-bucket/1-my%20file.txt"
        );
    }
}

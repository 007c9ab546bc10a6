use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use bytes::Bytes;

use super::{ByteRange, CompletedPart, ObjectMeta, ObjectStore};

/// Per-bucket S3 client, built from transiently-decrypted credentials:
/// buckets store only ciphertext, and plaintext is materialized just
/// long enough to build the client (endpoint_url + path-style + static
/// credentials), one client per bucket rather than one process-wide
/// endpoint.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Builds a client for a catalog `Bucket` row, decrypting its
    /// credentials with `cipher_key` only for the duration of this call.
    pub fn for_bucket(
        endpoint: &str,
        bucket_name: &str,
        access_key_ct: &[u8],
        secret_key_ct: &[u8],
        use_tls: bool,
        cipher_key: &[u8; 32],
    ) -> anyhow::Result<Self> {
        let access_key = crate::crypto::open(cipher_key, access_key_ct).context("decrypting access key")?;
        let secret_key = crate::crypto::open(cipher_key, secret_key_ct).context("decrypting secret key")?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "datas3t-bucket-config");
        let url = if endpoint.contains("://") {
            endpoint.to_owned()
        } else {
            format!("{}://{}", if use_tls { "https" } else { "http" }, endpoint)
        };

        // §7's UpstreamTransient retry contract (5xx/429, exponential
        // backoff) is delegated to the SDK's own standard retry mode
        // rather than hand-rolled, the same way aws_utils wires
        // `RetryConfig` for its own S3 client.
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::v2023_11_09())
            .endpoint_url(url)
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .force_path_style(true)
            .retry_config(RetryConfig::standard().with_max_attempts(5))
            .build();

        Ok(Self::new(aws_sdk_s3::Client::from_conf(config), bucket_name.to_owned()))
    }

    fn presigning_config(ttl: Duration) -> anyhow::Result<PresigningConfig> {
        Ok(PresigningConfig::expires_in(ttl)?)
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool
where
    E: std::error::Error + Send + Sync + 'static,
{
    matches!(err, SdkError::ServiceError(e) if e.raw().status().as_u16() == 404)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn head(&self, key: &str) -> anyhow::Result<Option<ObjectMeta>> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(out) => Ok(Some(ObjectMeta {
                size: out.content_length().unwrap_or_default().max(0) as u64,
            })),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, key: &str) -> anyhow::Result<Bytes> {
        let out = self.client.get_object().bucket(&self.bucket).key(key).send().await?;
        Ok(out.body.collect().await?.into_bytes())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_range(&self, key: &str, range: ByteRange) -> anyhow::Result<Bytes> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range.to_header())
            .send()
            .await?;
        Ok(out.body.collect().await?.into_bytes())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        match self.client.delete_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }
            let out = req.send().await?;
            for obj in out.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_owned());
                }
            }
            if out.is_truncated().unwrap_or(false) {
                continuation_token = out.next_continuation_token().map(str::to_owned);
            } else {
                break;
            }
        }
        Ok(keys)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn create_multipart_upload(&self, key: &str) -> anyhow::Result<String> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        out.upload_id().map(str::to_owned).context("S3 did not return an UploadId")
    }

    #[tracing::instrument(level = "debug", skip(self, parts))]
    async fn complete_multipart_upload(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> anyhow::Result<()> {
        let completed_parts: Vec<AwsCompletedPart> = parts
            .into_iter()
            .map(|p| AwsCompletedPart::builder().part_number(p.part_number).e_tag(p.e_tag).build())
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed_parts)).build())
            .send()
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, range: Option<ByteRange>, ttl: Duration) -> anyhow::Result<String> {
        let presigning = Self::presigning_config(ttl)?;
        let mut req = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = range {
            req = req.range(range.to_header());
        }
        let presigned = req.presigned(presigning).await?;
        Ok(presigned.uri().to_owned())
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        let presigning = Self::presigning_config(ttl)?;
        let presigned = self.client.put_object().bucket(&self.bucket).key(key).presigned(presigning).await?;
        Ok(presigned.uri().to_owned())
    }

    async fn presign_delete(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        let presigning = Self::presigning_config(ttl)?;
        let presigned = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await?;
        Ok(presigned.uri().to_owned())
    }

    async fn presign_upload_part(&self, key: &str, upload_id: &str, part_number: i32, ttl: Duration) -> anyhow::Result<String> {
        let presigning = Self::presigning_config(ttl)?;
        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(presigning)
            .await?;
        Ok(presigned.uri().to_owned())
    }
}

//! S3 bucket implementation with paginated prefix listing

use crate::{BucketObject, ObjectBucket};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;

/// An S3 bucket
///
/// Creating an S3 client is relatively expensive, so one client is kept for
/// the lifetime of the bucket handle.
pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Bucket {
    /// Create a handle using the default AWS configuration chain
    pub async fn connect(bucket: &str) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = aws_sdk_s3::Client::new(&sdk_config);
        Ok(Self::from_client(client, bucket))
    }

    pub fn from_client(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectBucket for S3Bucket {
    fn display_name(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    /// List all objects under a prefix
    ///
    /// S3 doesn't have true directories, so "directory" marker keys (ending
    /// with `/`) are skipped.
    async fn list(&self, prefix: &str) -> Result<Vec<BucketObject>> {
        let bucket = &self.bucket;
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to list S3 prefix: s3://{bucket}/{prefix}"))?;

            for object in response.contents.unwrap_or_default() {
                let Some(key) = object.key else { continue };
                if key.ends_with('/') {
                    continue;
                }
                results.push(BucketObject {
                    name: key,
                    size: object.size.unwrap_or(0).max(0) as u64,
                });
            }

            if response.is_truncated == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            "Listed {} objects in S3 prefix: s3://{}/{}",
            results.len(),
            bucket,
            prefix
        );

        Ok(results)
    }

    async fn upload_file(&self, name: &str, path: &Path) -> Result<()> {
        let bucket = &self.bucket;
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open file for upload: {}", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(name)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to s3://{bucket}/{name}", path.display()))?;

        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let bucket = &self.bucket;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .with_context(|| format!("Failed to delete S3 object: s3://{bucket}/{name}"))?;
        Ok(())
    }

    fn object_url(&self, name: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{name}", self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_bucket(name: &str) -> S3Bucket {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        S3Bucket::from_client(aws_sdk_s3::Client::from_conf(config), name)
    }

    #[test]
    fn test_object_url_virtual_hosted() {
        let bucket = offline_bucket("gis-attachments");
        assert_eq!(
            bucket.object_url("parcels/12.jpg"),
            "https://gis-attachments.s3.amazonaws.com/parcels/12.jpg"
        );
        assert_eq!(bucket.display_name(), "s3://gis-attachments");
    }

    // Listing and writing need credentials and a reachable endpoint; they are
    // exercised against LocalBucket and the in-memory bucket instead.
}

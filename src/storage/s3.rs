//! S3-compatible object storage backend
//!
//! Uses the AWS SDK directly. Works against AWS S3 and S3-compatible
//! endpoints (MinIO, Ceph, Wasabi) when an endpoint URL and path-style
//! addressing are configured.

use crate::error::{Result, StoreCopyError};
use crate::storage::{
    join_key, relative_path, Item, ItemReader, ItemSink, ItemStream, Storage, DEFAULT_QUEUE_DEPTH,
};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

/// Keys requested per listing page.
const LIST_PAGE_SIZE: i32 = 1000;

/// Part size for multipart upload: 8 MB. Content shorter than one part is
/// sent with a single `PutObject`.
const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// S3 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// AWS region
    pub region: String,
    /// Custom endpoint URL (for MinIO, Ceph, etc.)
    pub endpoint: Option<String>,
    /// Access key ID (falls back to the AWS credential chain)
    pub access_key_id: Option<String>,
    /// Secret access key (falls back to the AWS credential chain)
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Bucket name
    pub bucket: String,
    /// Key prefix
    pub prefix: String,
    /// Use path-style URLs (required for some S3-compatible services)
    pub path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            bucket: String::new(),
            prefix: String::new(),
            path_style: false,
        }
    }
}

impl S3Config {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(StoreCopyError::config("Bucket name is required"));
        }
        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(StoreCopyError::config(format!(
                "Invalid region name {}",
                self.region
            )));
        }
        if let Some(endpoint) = &self.endpoint {
            let url = reqwest::Url::parse(endpoint).map_err(|e| {
                StoreCopyError::config(format!("Invalid endpoint {}: {}", endpoint, e))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(StoreCopyError::config(format!(
                    "Unknown endpoint scheme in {}",
                    endpoint
                )));
            }
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(StoreCopyError::config(
                "Access key and secret key must be given together",
            ));
        }
        Ok(())
    }
}

/// Storage backed by one S3 bucket and key prefix.
#[derive(Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    queue_depth: Option<usize>,
}

impl S3Storage {
    /// Build an SDK client from configuration.
    pub async fn connect(config: &S3Config) -> Result<Self> {
        config.validate()?;

        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(ref endpoint) = config.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        if let (Some(ref key_id), Some(ref secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let creds = aws_credential_types::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiry
                "storecopy-static",
            );
            aws_config_builder = aws_config_builder.credentials_provider(creds);
        }

        let aws_config = aws_config_builder.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
        if config.path_style {
            s3_config = s3_config.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config.build());
        Ok(Self::new(client, &config.bucket, &config.prefix))
    }

    /// Wrap an existing client.
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            queue_depth: Some(DEFAULT_QUEUE_DEPTH),
        }
    }

    /// Set how many discovered items may wait in the queue (`None` = unbounded)
    pub fn with_queue_depth(mut self, depth: Option<usize>) -> Self {
        self.queue_depth = depth;
        self
    }

    async fn put_single(&self, key: &str, content_type: &str, data: Vec<u8>) -> Result<u64> {
        let len = data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(len as i64)
            .content_type(content_type)
            .acl(ObjectCannedAcl::BucketOwnerFullControl)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                StoreCopyError::remote(format!("S3 put_object failed: {}", DisplayErrorContext(&e)))
            })?;

        Ok(len)
    }

    async fn put_multipart(
        &self,
        key: &str,
        content_type: &str,
        first: Vec<u8>,
        reader: &mut ItemReader,
    ) -> Result<u64> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .acl(ObjectCannedAcl::BucketOwnerFullControl)
            .send()
            .await
            .map_err(|e| {
                StoreCopyError::remote(format!(
                    "S3 create_multipart_upload failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| StoreCopyError::remote("Missing upload_id"))?
            .to_string();

        match self.upload_parts(key, &upload_id, first, reader).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Could not abort multipart upload of {}: {}",
                        key,
                        DisplayErrorContext(&abort)
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        reader: &mut ItemReader,
    ) -> Result<u64> {
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut written = 0u64;
        let mut chunk = first;

        while !chunk.is_empty() {
            let len = chunk.len() as u64;
            let upload_part = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(len as i64)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| {
                    StoreCopyError::remote(format!(
                        "S3 upload_part failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            let etag = upload_part.e_tag().unwrap_or_default().to_string();
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            written += len;
            part_number += 1;
            chunk = read_part(reader).await.map_err(|e| StoreCopyError::io(key, e))?;
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                StoreCopyError::remote(format!(
                    "S3 complete_multipart_upload failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(written)
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    fn list_files(&self) -> ItemStream {
        let (sink, stream) = ItemStream::channel(self.queue_depth);
        tokio::spawn(list_objects(
            self.client.clone(),
            self.bucket.clone(),
            self.prefix.clone(),
            sink,
        ));
        stream
    }

    async fn put_file(&self, mut item: Item) -> Result<u64> {
        let key = join_key(&self.prefix, item.relative_path());
        let content_type = item.content_type();

        let first = read_part(&mut item.content)
            .await
            .map_err(|e| StoreCopyError::io(&item.path, e))?;

        if first.len() < MULTIPART_PART_SIZE {
            if let Some(size) = item.size {
                if size != first.len() as u64 {
                    tracing::debug!(
                        "{} listed as {} bytes but {} were read",
                        item.path,
                        size,
                        first.len()
                    );
                }
            }
            self.put_single(&key, &content_type, first).await
        } else {
            self.put_multipart(&key, &content_type, first, &mut item.content)
                .await
        }
    }
}

/// Read up to one part from the stream. A short result means end of stream.
async fn read_part(reader: &mut ItemReader) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(MULTIPART_PART_SIZE as u64)
        .read_to_end(&mut buf)
        .await?;
    Ok(buf)
}

/// Keys that only mark a "directory" and carry no content of their own.
fn is_directory_marker(prefix: &str, key: &str) -> bool {
    key.ends_with('/') || relative_path(prefix, key).is_empty()
}

async fn list_objects(client: aws_sdk_s3::Client, bucket: String, prefix: String, sink: ItemSink) {
    let mut marker: Option<String> = None;

    loop {
        let resp = match client
            .list_objects()
            .bucket(&bucket)
            .prefix(&prefix)
            .set_marker(marker.clone())
            .max_keys(LIST_PAGE_SIZE)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(
                    "{}",
                    StoreCopyError::enumeration(
                        format!("bucket {}", bucket),
                        DisplayErrorContext(&e)
                    )
                );
                return;
            }
        };

        let contents = resp.contents();
        for object in contents {
            let Some(key) = object.key() else {
                continue;
            };
            marker = Some(key.to_string());

            if is_directory_marker(&prefix, key) {
                tracing::debug!("Skipping directory marker {}", key);
                continue;
            }

            let body = match client.get_object().bucket(&bucket).key(key).send().await {
                Ok(output) => output.body,
                Err(e) => {
                    tracing::warn!("{}", StoreCopyError::open(key, DisplayErrorContext(&e)));
                    continue;
                }
            };

            let size = object.size().and_then(|s| u64::try_from(s).ok());
            let item = Item::new(prefix.as_str(), key, size, body.into_async_read());
            if !sink.send(item).await {
                tracing::debug!("Item queue closed, stopping listing of {}", bucket);
                return;
            }
        }

        if contents.is_empty() || !resp.is_truncated().unwrap_or(false) {
            break;
        }
    }
}

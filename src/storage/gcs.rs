//! Google Cloud Storage backend
//!
//! Talks to the GCS JSON API with reqwest. Authentication is a bearer
//! token obtained elsewhere (e.g. `gcloud auth print-access-token`).

use crate::error::{Result, StoreCopyError};
use crate::storage::{join_key, relative_path, Item, ItemSink, ItemStream, Storage, DEFAULT_QUEUE_DEPTH};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};

/// Public GCS API endpoint.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Objects requested per listing page.
const LIST_PAGE_SIZE: u32 = 1000;

/// GCS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcsConfig {
    /// Bucket name
    pub bucket: String,
    /// Object name prefix
    pub prefix: String,
    /// OAuth2 access token
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// API endpoint (override for emulators)
    pub endpoint: String,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            token: None,
            endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
        }
    }
}

impl GcsConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(StoreCopyError::config("Bucket name is required"));
        }
        if self.token.as_deref().map_or(true, str::is_empty) {
            return Err(StoreCopyError::config("A GCS access token is required"));
        }
        let url = Url::parse(&self.endpoint).map_err(|e| {
            StoreCopyError::config(format!("Invalid endpoint {}: {}", self.endpoint, e))
        })?;
        if url.cannot_be_a_base() {
            return Err(StoreCopyError::config(format!(
                "Invalid endpoint {}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

/// One page of `objects.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    // The JSON API encodes uint64 values as strings.
    size: Option<String>,
}

/// Storage backed by one GCS bucket and object prefix.
#[derive(Clone)]
pub struct GcsStorage {
    http: reqwest::Client,
    endpoint: Url,
    bucket: String,
    prefix: String,
    token: String,
    queue_depth: Option<usize>,
}

impl GcsStorage {
    /// Create a client from configuration.
    pub fn new(config: &GcsConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| StoreCopyError::config(format!("Invalid endpoint: {}", e)))?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            token: config.token.clone().unwrap_or_default(),
            queue_depth: Some(DEFAULT_QUEUE_DEPTH),
        })
    }

    /// Set how many discovered items may wait in the queue (`None` = unbounded)
    pub fn with_queue_depth(mut self, depth: Option<usize>) -> Self {
        self.queue_depth = depth;
        self
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreCopyError::config(format!("Invalid endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn list_url(&self, page_token: Option<&str>) -> Result<Url> {
        let mut url = self.api_url(&["storage", "v1", "b", self.bucket.as_str(), "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("maxResults", &LIST_PAGE_SIZE.to_string());
            if !self.prefix.is_empty() {
                query.append_pair("prefix", &self.prefix);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn media_url(&self, name: &str) -> Result<Url> {
        let mut url = self.api_url(&["storage", "v1", "b", self.bucket.as_str(), "o", name])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self, name: &str) -> Result<Url> {
        let mut url = self.api_url(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name)
            .append_pair("predefinedAcl", "bucketOwnerFullControl");
        Ok(url)
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<ObjectList> {
        let resp = self
            .http
            .get(self.list_url(page_token)?)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn open_object(&self, object: &ObjectResource) -> Result<Item> {
        let resp = self
            .http
            .get(self.media_url(&object.name)?)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        let body = resp.bytes_stream().map_err(std::io::Error::other);
        let size = object.size.as_deref().and_then(|s| s.parse().ok());

        Ok(Item::new(
            self.prefix.as_str(),
            object.name.as_str(),
            size,
            StreamReader::new(body),
        ))
    }

    async fn produce(self, sink: ItemSink) {
        let mut page_token: Option<String> = None;

        loop {
            let page = match self.list_page(page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(
                        "{}",
                        StoreCopyError::enumeration(format!("bucket {}", self.bucket), e)
                    );
                    return;
                }
            };

            for object in &page.items {
                if object.name.ends_with('/') || relative_path(&self.prefix, &object.name).is_empty() {
                    tracing::debug!("Skipping directory marker {}", object.name);
                    continue;
                }

                let item = match self.open_object(object).await {
                    Ok(item) => item,
                    Err(e) => {
                        tracing::warn!("{}", StoreCopyError::open(object.name.as_str(), e));
                        continue;
                    }
                };

                if !sink.send(item).await {
                    tracing::debug!("Item queue closed, stopping listing of {}", self.bucket);
                    return;
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
    }
}

#[async_trait]
impl Storage for GcsStorage {
    fn location(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.prefix)
    }

    fn list_files(&self) -> ItemStream {
        let (sink, stream) = ItemStream::channel(self.queue_depth);
        tokio::spawn(self.clone().produce(sink));
        stream
    }

    async fn put_file(&self, item: Item) -> Result<u64> {
        let name = join_key(&self.prefix, item.relative_path());
        let content_type = item.content_type();

        let mut request = self
            .http
            .post(self.upload_url(&name)?)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type);
        if let Some(size) = item.size {
            request = request.header(CONTENT_LENGTH, size);
        }

        let resp = request
            .body(reqwest::Body::wrap_stream(ReaderStream::new(item.content)))
            .send()
            .await
            .map_err(|e| StoreCopyError::remote(format!("GCS insert of {} failed: {}", name, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(StoreCopyError::remote(format!(
                "GCS insert of {} failed with {}: {}",
                name,
                status,
                detail.trim()
            )));
        }

        let body = resp.bytes().await?;
        let inserted: ObjectResource = serde_json::from_slice(&body)?;
        Ok(inserted
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }
}

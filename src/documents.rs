//! Document upload and streamed download.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Method;

use crate::error::{Result, VantiqError};
use crate::models::{ErrorDetail, ResponseBody, VantiqResponse};
use crate::resources;
use crate::rest::{self, RestExecutor};

/// Multipart field the server reads the uploaded content from.
const UPLOAD_FIELD: &str = "file";

/// Single-pass reader over a download body.
///
/// Holds the open HTTP response; nothing is buffered until the caller
/// reads. Once exhausted, further reads return `None`.
pub struct DocumentStream {
    source_url: String,
    response: Option<reqwest::Response>,
    bytes_read: u64,
}

impl fmt::Debug for DocumentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStream")
            .field("source_url", &self.source_url)
            .field("exhausted", &self.response.is_none())
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

impl DocumentStream {
    fn new(source_url: String, response: reqwest::Response) -> Self {
        Self {
            source_url,
            response: Some(response),
            bytes_read: 0,
        }
    }

    /// The fully resolved URL every chunk comes from.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Size announced by the server, if it sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.response.as_ref().and_then(reqwest::Response::content_length)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Next non-empty chunk, or `None` at end of body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            let Some(response) = self.response.as_mut() else {
                return Ok(None);
            };
            match response.chunk().await? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => {
                    self.bytes_read += chunk.len() as u64;
                    return Ok(Some(chunk));
                },
                None => {
                    self.response = None;
                    return Ok(None);
                },
            }
        }
    }

    /// Read the rest of the body into memory.
    pub async fn read_all(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

/// Uploads and downloads named binary resources.
#[derive(Clone)]
pub struct DocumentTransfer {
    server_url: String,
    rest: RestExecutor,
}

impl DocumentTransfer {
    pub(crate) fn new(server_url: String, rest: RestExecutor) -> Self {
        Self { server_url, rest }
    }

    /// Upload a document-like resource (documents, images, videos).
    ///
    /// Exactly one of `filename` (read from disk) or `inmem` supplies the
    /// content. The stored name is `doc_name` if given, else the base name
    /// of `filename`; leading `/` separators are stripped either way.
    /// The response body is the created resource's metadata.
    pub async fn upload(
        &self,
        kind: &str,
        content_type: &str,
        filename: Option<&Path>,
        inmem: Option<Bytes>,
        doc_name: Option<&str>,
    ) -> Result<VantiqResponse> {
        let (content, derived_name) = match (filename, inmem) {
            (Some(_), Some(_)) => {
                return Err(VantiqError::ValidationError(
                    "Supply either a filename or in-memory content to upload, not both".to_string(),
                ))
            },
            (None, None) => {
                return Err(VantiqError::ValidationError(
                    "Nothing to upload: supply a filename or in-memory content".to_string(),
                ))
            },
            (Some(path), None) => {
                let content = tokio::fs::read(path).await.map_err(|e| {
                    VantiqError::ValidationError(format!("Cannot read '{}': {}", path.display(), e))
                })?;
                let base = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                (Bytes::from(content), base)
            },
            (None, Some(content)) => (content, None),
        };

        let name = doc_name
            .map(str::to_string)
            .or(derived_name)
            .map(|name| name.trim_start_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                VantiqError::ValidationError(
                    "A document name is required when uploading in-memory content".to_string(),
                )
            })?;

        let size = content.len();
        let part = Part::stream_with_length(content, size as u64)
            .file_name(name.clone())
            .mime_str(content_type)
            .map_err(|e| {
                VantiqError::ValidationError(format!("Invalid content type '{}': {}", content_type, e))
            })?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let url = self.rest.url(&resources::resource_path(kind));
        let start = Instant::now();
        debug!("[DOCS] Uploading '{}' ({} bytes, {}) to {}", name, size, content_type, url);

        let response = self
            .rest
            .request(Method::POST, &url, true)
            .multipart(form)
            .send()
            .await?;
        let result = rest::read_response(response, false).await?;

        if result.is_success() {
            debug!("[DOCS] Uploaded '{}' duration_ms={}", name, start.elapsed().as_millis());
        } else {
            warn!("[DOCS] Upload of '{}' failed with status {}", name, result.status_code);
        }
        Ok(result)
    }

    /// Resolve a `content` path (e.g. `/docs/name`) against the server URL.
    /// Absolute URLs are used as-is.
    pub fn content_url(&self, content: &str) -> String {
        if content.starts_with("http://") || content.starts_with("https://") {
            content.to_string()
        } else {
            format!("{}/{}", self.server_url, content.trim_start_matches('/'))
        }
    }

    /// Start a streamed download. On success the body is a
    /// [`ResponseBody::Stream`] read at the caller's pace.
    pub async fn download(&self, content_url: &str) -> Result<VantiqResponse> {
        let url = self.content_url(content_url);
        debug!("[DOCS] Downloading {}", url);

        let send = self.rest.request(Method::GET, &url, false).send();
        let response = match self.rest.request_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, send).await.map_err(|_| {
                VantiqError::TimeoutError(format!("No response for {} within {:?}", url, timeout))
            })??,
            None => send.await?,
        };

        let status = response.status().as_u16();
        let content_type = rest::content_type_of(&response);
        if status >= 400 {
            let body = response.bytes().await?;
            warn!("[DOCS] Download of {} failed with status {}", url, status);
            return Ok(VantiqResponse::failure(
                status,
                content_type,
                ErrorDetail::parse_body(status, &body),
            ));
        }

        Ok(VantiqResponse::success(
            status,
            content_type,
            ResponseBody::Stream(DocumentStream::new(url, response)),
        ))
    }

    /// Download, handing each chunk to `handler` as
    /// `(source_url, chunk_len, chunk)`.
    ///
    /// On success the returned body is empty; the content went to `handler`.
    pub async fn download_to<F>(&self, content_url: &str, mut handler: F) -> Result<VantiqResponse>
    where
        F: FnMut(&str, usize, &[u8]),
    {
        let mut response = self.download(content_url).await?;
        if !response.is_success() {
            return Ok(response);
        }

        let Some(mut stream) = std::mem::take(&mut response.body).into_stream() else {
            return Ok(response);
        };
        while let Some(chunk) = stream.chunk().await? {
            handler(stream.source_url(), chunk.len(), &chunk);
        }
        debug!("[DOCS] Delivered {} bytes from {}", stream.bytes_read(), stream.source_url());
        Ok(response)
    }
}

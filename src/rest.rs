//! CRUD-style resource operations over HTTP.
//!
//! Every operation returns a [`VantiqResponse`]. Server-reported failures
//! come back as a failed response with parsed error records; only transport
//! failures surface as `Err`. Nothing is retried here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{Map, Value as JsonValue};

use crate::auth::TokenStore;
use crate::error::{Result, VantiqError};
use crate::models::{ErrorDetail, ResponseBody, VantiqResponse};
use crate::query::QueryParams;
use crate::resources;

/// Response header carrying the total row count.
pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

/// Projection used by `count` to keep the response body minimal.
const COUNT_PROPS: [&str; 1] = ["_id"];

/// Issues resource operations against `<server>/api/v<n>/resources/`.
#[derive(Clone)]
pub struct RestExecutor {
    api_base: String,
    http_client: reqwest::Client,
    tokens: Arc<TokenStore>,
    request_timeout: Option<Duration>,
}

impl RestExecutor {
    pub(crate) fn new(
        api_base: String,
        http_client: reqwest::Client,
        tokens: Arc<TokenStore>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            api_base,
            http_client,
            tokens,
            request_timeout,
        }
    }

    pub(crate) fn url(&self, resource_path: &str) -> String {
        format!("{}/resources/{}", self.api_base, resource_path)
    }

    pub(crate) fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// A request carrying the bearer token. The request timeout is applied
    /// when `timed` is set; streamed downloads time only their head.
    pub(crate) fn request(&self, method: Method, url: &str, timed: bool) -> reqwest::RequestBuilder {
        let mut request = self.tokens.apply_to_request(self.http_client.request(method, url));
        if let (true, Some(timeout)) = (timed, self.request_timeout) {
            request = request.timeout(timeout);
        }
        request
    }

    /// Read the rows of `kind` matching `query`.
    pub async fn select(&self, kind: &str, query: &QueryParams) -> Result<VantiqResponse> {
        let url = query.append_to(&self.url(&resources::resource_path(kind)));
        self.send(Method::GET, &url, None, query.wants_count()).await
    }

    /// Read one instance by id (a name, or `_id` for user types).
    pub async fn select_one(&self, kind: &str, id: &str) -> Result<VantiqResponse> {
        let url = self.url(&resources::instance_path(kind, id));
        self.send(Method::GET, &url, None, false).await
    }

    pub async fn insert(&self, kind: &str, instance: &JsonValue) -> Result<VantiqResponse> {
        let url = self.url(&resources::resource_path(kind));
        self.send(Method::POST, &url, Some(instance), false).await
    }

    pub async fn update(&self, kind: &str, id: &str, changes: &JsonValue) -> Result<VantiqResponse> {
        let url = self.url(&resources::instance_path(kind, id));
        self.send(Method::PUT, &url, Some(changes), false).await
    }

    /// Insert, or update the existing instance with the same natural key.
    pub async fn upsert(&self, kind: &str, instance: &JsonValue) -> Result<VantiqResponse> {
        let url = format!("{}?upsert=true", self.url(&resources::resource_path(kind)));
        self.send(Method::POST, &url, Some(instance), false).await
    }

    /// Delete every instance matching `filter` (all instances for `None`).
    ///
    /// The number removed is reported in `count`.
    pub async fn delete(&self, kind: &str, filter: Option<&JsonValue>) -> Result<VantiqResponse> {
        let query = QueryParams::new().with_count().filter_opt(filter.cloned());
        let url = query.append_to(&self.url(&resources::resource_path(kind)));
        let mut response = self.send(Method::DELETE, &url, None, true).await?;
        if response.is_success() && response.count.is_none() {
            response.count = response
                .body
                .as_object()
                .and_then(|body| body.get("count"))
                .and_then(JsonValue::as_u64);
        }
        Ok(response)
    }

    pub async fn delete_one(&self, kind: &str, id: &str) -> Result<VantiqResponse> {
        let url = self.url(&resources::instance_path(kind, id));
        self.send(Method::DELETE, &url, None, false).await
    }

    /// Count the instances matching `filter`.
    ///
    /// The count comes from the `X-Total-Count` header; the body is always
    /// [`ResponseBody::Empty`] on success.
    pub async fn count(&self, kind: &str, filter: Option<&JsonValue>) -> Result<VantiqResponse> {
        let query = QueryParams::new()
            .limit(1)
            .props(COUNT_PROPS)
            .filter_opt(filter.cloned());
        let url = query.append_to(&self.url(&resources::resource_path(kind)));
        let mut response = self.send(Method::GET, &url, None, true).await?;
        if response.is_success() {
            response.body = ResponseBody::Empty;
        }
        Ok(response)
    }

    /// Run a procedure. Missing parameters are sent as `{}`.
    pub async fn execute(&self, procedure: &str, params: Option<&JsonValue>) -> Result<VantiqResponse> {
        let url = self.url(&resources::instance_path(resources::PROCEDURES, procedure));
        let empty = JsonValue::Object(Map::new());
        let body = match params {
            None | Some(JsonValue::Null) => &empty,
            Some(params) => params,
        };
        self.send(Method::POST, &url, Some(body), false).await
    }

    /// Publish a message to a topic, a service event or a source.
    ///
    /// For services `id` is `<service>/<event>`.
    pub async fn publish(&self, kind: &str, id: &str, message: &JsonValue) -> Result<VantiqResponse> {
        if !matches!(kind, resources::TOPICS | resources::SERVICES | resources::SOURCES) {
            return Err(VantiqError::ValidationError(format!(
                "Publishing is only supported for topics, services and sources, not '{}'",
                kind
            )));
        }
        let url = self.url(&resources::instance_path(kind, id));
        self.send(Method::POST, &url, Some(message), false).await
    }

    /// Users authorized in `namespace`.
    pub async fn get_namespace_users(&self, namespace: &str) -> Result<VantiqResponse> {
        let path = format!(
            "{}/authorizedUsers",
            resources::instance_path(resources::NAMESPACES, namespace)
        );
        self.send(Method::GET, &self.url(&path), None, false).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
        wants_count: bool,
    ) -> Result<VantiqResponse> {
        let start = Instant::now();
        debug!("[REST] {} {}", method, url);

        let mut request = self.request(method.clone(), url, true);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!("[REST] {} {} failed: {} duration_ms={}", method, url, e, start.elapsed().as_millis());
            VantiqError::from(e)
        })?;

        let result = read_response(response, wants_count).await?;
        if result.is_success() {
            debug!(
                "[REST] {} {} -> {} duration_ms={}",
                method,
                url,
                result.status_code,
                start.elapsed().as_millis()
            );
        } else {
            warn!(
                "[REST] {} {} -> {} errors={} duration_ms={}",
                method,
                url,
                result.status_code,
                result.errors.len(),
                start.elapsed().as_millis()
            );
        }
        Ok(result)
    }
}

pub(crate) fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Normalize an HTTP response into the result envelope.
///
/// `count` is filled from `X-Total-Count` only when `wants_count` is set.
pub(crate) async fn read_response(response: reqwest::Response, wants_count: bool) -> Result<VantiqResponse> {
    let status = response.status().as_u16();
    let content_type = content_type_of(&response);
    let total = response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let bytes = response.bytes().await?;

    if status >= 400 {
        let errors = ErrorDetail::parse_body(status, &bytes);
        return Ok(VantiqResponse::failure(status, content_type, errors));
    }

    let body = parse_body(content_type.as_deref(), bytes);
    let mut result = VantiqResponse::success(status, content_type, body);
    if wants_count {
        result.count = total;
    }
    Ok(result)
}

/// JSON when it parses as JSON (unless the content type says binary),
/// raw bytes otherwise.
fn parse_body(content_type: Option<&str>, bytes: bytes::Bytes) -> ResponseBody {
    if bytes.is_empty() {
        return ResponseBody::Empty;
    }
    let maybe_json = match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("json") || ct.starts_with("text/")
        },
    };
    if maybe_json {
        if let Ok(value) = serde_json::from_slice::<JsonValue>(&bytes) {
            return ResponseBody::from_json(value);
        }
    }
    ResponseBody::Bytes(bytes)
}

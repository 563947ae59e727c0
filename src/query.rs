//! Query-string encoding for filtered reads and deletes.
//!
//! Emitted pairs always appear in this order: `count`/`limit`, `props`,
//! caller options (in the order given), `sort`, `where`. Components the
//! caller did not supply are omitted entirely.

use serde_json::Value as JsonValue;

/// Selection parameters for `select`, `count` and filtered `delete`.
///
/// # Examples
///
/// ```rust
/// use vantiq_link::QueryParams;
/// use serde_json::json;
///
/// let query = QueryParams::new()
///     .props(["name", "ars_version"])
///     .filter(json!({"name": "MyType"}))
///     .limit(10);
/// assert!(query.encode().starts_with("count=true&limit=10&props="));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Fields to return (projection).
    pub props: Option<Vec<String>>,
    /// Structured filter, sent as `where`.
    pub filter: Option<JsonValue>,
    /// Field → direction mapping, e.g. `{"name": -1}`.
    pub sort: Option<JsonValue>,
    /// Row limit. Always emitted together with `count=true`.
    pub limit: Option<u64>,
    /// Extra `key=value` pairs, emitted verbatim in order.
    pub options: Vec<(String, String)>,
    /// Request a count without a limit.
    pub count: bool,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.props = Some(props.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: JsonValue) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Like [`filter`](Self::filter), for an optional filter.
    pub fn filter_opt(mut self, filter: Option<JsonValue>) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: JsonValue) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    /// `true` when a count was requested, explicitly or through a limit.
    pub fn wants_count(&self) -> bool {
        self.count || self.limit.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.encode().is_empty()
    }

    /// Encode as a query string without the leading `?`.
    pub fn encode(&self) -> String {
        let mut pairs: Vec<String> = Vec::new();

        if self.wants_count() {
            pairs.push("count=true".to_string());
        }
        if let Some(limit) = self.limit {
            pairs.push(format!("limit={}", limit));
        }
        if let Some(props) = &self.props {
            pairs.push(format!("props={}", encode_json(&JsonValue::from(props.clone()))));
        }
        for (key, value) in &self.options {
            pairs.push(format!("{}={}", key, value));
        }
        if let Some(sort) = &self.sort {
            pairs.push(format!("sort={}", encode_json(sort)));
        }
        if let Some(filter) = &self.filter {
            pairs.push(format!("where={}", encode_json(filter)));
        }

        pairs.join("&")
    }

    /// Append the encoded query to `url`, if there is one.
    pub(crate) fn append_to(&self, url: &str) -> String {
        let query = self.encode();
        if query.is_empty() {
            url.to_string()
        } else {
            format!("{}?{}", url, query)
        }
    }
}

/// Compact JSON, then percent-encoded.
fn encode_json(value: &JsonValue) -> String {
    urlencoding::encode(&value.to_string()).into_owned()
}

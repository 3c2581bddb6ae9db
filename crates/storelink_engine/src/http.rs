//! REST adapter.
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! depend on a particular HTTP library. [`RestAdapter`] speaks the
//! storefront's `api/{resource}` conventions on top of it and translates
//! statuses into the engine's error taxonomy.

use crate::adapter::{into_values, Adapter, SearchFilter};
use crate::error::{SyncError, SyncResult};
use serde_json::{json, Value};
use std::sync::Arc;
use storelink_core::{ExternalId, Values};
use tracing::debug;
use url::Url;

/// HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// JSON body.
    pub body: Option<Value>,
    /// API user and key.
    pub credentials: Option<(String, String)>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Decoded JSON body (`Null` when empty).
    pub body: Value,
}

/// HTTP client abstraction.
///
/// `Err` means the request never got a response (DNS, refused connection,
/// timeout) and is treated as retryable.
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        (**self).send(request)
    }
}

/// Adapter for one REST resource (e.g. `customers`, `articles`).
pub struct RestAdapter<C: HttpClient> {
    api_url: String,
    resource: String,
    credentials: Option<(String, String)>,
    client: C,
}

impl<C: HttpClient> RestAdapter<C> {
    /// Creates an adapter. `api_url` must end with `/`.
    pub fn new(api_url: impl Into<String>, resource: impl Into<String>, client: C) -> Self {
        Self {
            api_url: api_url.into(),
            resource: resource.into(),
            credentials: None,
            client,
        }
    }

    /// Sets the API credentials sent with each request.
    pub fn with_credentials(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), token.into()));
        self
    }

    /// Returns the resource name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn url(&self, path: Option<&str>, query: &[(String, String)]) -> SyncResult<Url> {
        let mut url = Url::parse(&self.api_url)?.join(&self.resource)?;
        if let Some(path) = path {
            url.path_segments_mut()
                .map_err(|()| SyncError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
                .push(path);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn send(&self, method: HttpMethod, url: Url, body: Option<Value>) -> SyncResult<Value> {
        debug!(resource = %self.resource, ?method, %url, "calling remote API");
        let request = HttpRequest {
            method,
            url: url.into(),
            body,
            credentials: self.credentials.clone(),
        };
        let response = self
            .client
            .send(&request)
            .map_err(|e| SyncError::transport_retryable(format!("network error: {e}")))?;
        check_status(&request, response)
    }

    fn list(&self, filter: &SearchFilter) -> SyncResult<Vec<Values>> {
        let body = self.send(HttpMethod::Get, self.url(None, &filter_query(filter))?, None)?;
        match body.get("data") {
            Some(Value::Array(rows)) => rows.iter().cloned().map(into_values).collect(),
            _ => Err(SyncError::Protocol(format!(
                "{}: listing without a data array",
                self.resource
            ))),
        }
    }
}

impl<C: HttpClient> Adapter for RestAdapter<C> {
    fn search(&self, filter: &SearchFilter) -> SyncResult<Vec<ExternalId>> {
        self.list(filter)?
            .iter()
            .map(|row| {
                row.get("id")
                    .and_then(ExternalId::from_value)
                    .ok_or_else(|| SyncError::Protocol(format!("{}: row without id", self.resource)))
            })
            .collect()
    }

    fn read(&self, id: &ExternalId) -> SyncResult<Values> {
        let body = self
            .send(HttpMethod::Get, self.url(Some(&id.to_string()), &[])?, None)
            .map_err(|err| match err {
                SyncError::NotFoundRemotely { .. } => SyncError::NotFoundRemotely { id: id.to_string() },
                other => other,
            })?;
        into_values(body.get("data").cloned().unwrap_or(Value::Null))
    }

    fn search_read(&self, filter: &SearchFilter) -> SyncResult<Vec<Values>> {
        self.list(filter)
    }

    fn create(&self, data: &Values) -> SyncResult<ExternalId> {
        let body = self.send(
            HttpMethod::Post,
            self.url(None, &[])?,
            Some(Value::Object(data.clone())),
        )?;
        body.get("data")
            .and_then(|d| d.get("id"))
            .and_then(ExternalId::from_value)
            .ok_or_else(|| SyncError::Protocol(format!("{}: creation returned no id", self.resource)))
    }

    fn write(&self, id: &ExternalId, data: &Values) -> SyncResult<()> {
        self.send(
            HttpMethod::Put,
            self.url(Some(&id.to_string()), &[])?,
            Some(Value::Object(data.clone())),
        )?;
        Ok(())
    }

    fn delete(&self, id: &ExternalId) -> SyncResult<()> {
        self.send(HttpMethod::Delete, self.url(Some(&id.to_string()), &[])?, None)?;
        Ok(())
    }

    fn call(&self, method: &str, args: &Value) -> SyncResult<Value> {
        let query: Vec<(String, String)> = match args {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), plain(v))).collect(),
            _ => Vec::new(),
        };
        let body = self.send(HttpMethod::Get, self.url(Some(method), &query)?, None)?;
        Ok(body.get("data").cloned().unwrap_or(body))
    }
}

/// Maps a response status onto the error taxonomy.
fn check_status(request: &HttpRequest, response: HttpResponse) -> SyncResult<Value> {
    let message = || {
        response
            .body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    match response.status {
        200..=299 => {
            if response.body.get("success") == Some(&Value::Bool(false)) {
                Err(SyncError::transport_fatal(format!(
                    "request to {} refused: {}",
                    request.url,
                    message()
                )))
            } else {
                Ok(response.body)
            }
        }
        404 => Err(SyncError::NotFoundRemotely { id: request.url.clone() }),
        409 => Err(SyncError::AlreadyExists(message())),
        // bad gateway, unavailable, gateway timeout, rate limited
        429 | 502 | 503 | 504 => Err(SyncError::transport_retryable(format!(
            "protocol error on {}: status {} {}",
            request.url,
            response.status,
            message()
        ))),
        status => Err(SyncError::transport_fatal(format!(
            "request to {} failed with status {status}: {}",
            request.url,
            message()
        ))),
    }
}

/// Builds the `filter[n][...]` query pairs understood by the REST API.
fn filter_query(filter: &SearchFilter) -> Vec<(String, String)> {
    let mut parts: Vec<(String, String, String)> = Vec::new();
    if let Some(from) = filter.from_date {
        parts.push(("changed".into(), ">=".into(), from.to_rfc3339()));
    }
    if let Some(to) = filter.to_date {
        parts.push(("changed".into(), "<=".into(), to.to_rfc3339()));
    }
    for (field, value) in &filter.conditions {
        parts.push((field.clone(), "=".into(), plain(value)));
    }
    parts
        .into_iter()
        .enumerate()
        .flat_map(|(index, (property, expression, value))| {
            [
                (format!("filter[{index}][property]"), property),
                (format!("filter[{index}][expression]"), expression),
                (format!("filter[{index}][value]"), value),
            ]
        })
        .collect()
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convenience for building the data envelope the REST API answers with.
pub fn envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

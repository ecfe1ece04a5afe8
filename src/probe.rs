use crate::{Error, Result};
use reqwest::{Client, Method, Response, StatusCode, header};
use serde_json::Value;
use std::time::Duration;

/// Body of a probe response, parsed according to its content type
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeBody {
    Json(Value),
    Text(String),
}

impl ProbeBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: ProbeBody,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Issues single HTTP requests against the hub.
///
/// There are no retries: one failed request is one failed probe.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<ProbeResponse> {
        tracing::debug!(%method, url, "probe request");

        let mut request = self.client.request(method, url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| Error::connectivity(url, describe(&err)))?;

        let status = response.status();
        let content_type = content_type(&response);
        let text = response
            .text()
            .await
            .map_err(|err| Error::connectivity(url, describe(&err)))?;

        let body = parse_body(content_type.as_deref(), text);
        tracing::debug!(url, %status, "probe response");

        Ok(ProbeResponse {
            status,
            content_type,
            body,
        })
    }

    pub async fn get(&self, url: &str, timeout: Duration) -> Result<ProbeResponse> {
        self.request(Method::GET, url, None, &[], timeout).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<ProbeResponse> {
        self.request(Method::POST, url, Some(body), &[], timeout)
            .await
    }

    /// GETs `url` and requires a successful status with a JSON body
    pub async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value> {
        let response = self.get(url, timeout).await?;

        if !response.is_success() {
            return Err(Error::Protocol(format!(
                "GET {url} returned unexpected status {}",
                response.status
            )));
        }

        match response.body {
            ProbeBody::Json(value) => Ok(value),
            ProbeBody::Text(text) => Err(Error::Protocol(format!(
                "GET {url} did not return JSON: {}",
                preview(&text)
            ))),
        }
    }

    /// Opens a streaming GET without reading the body.
    ///
    /// `timeout` bounds the whole exchange, including reading the stream.
    pub async fn open_stream(&self, url: &str, timeout: Duration) -> Result<Response> {
        tracing::debug!(url, "opening event stream");

        self.client
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| Error::connectivity(url, describe(&err)))
    }
}

pub(crate) fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn parse_body(content_type: Option<&str>, text: String) -> ProbeBody {
    let declared_json = content_type.is_some_and(|ct| ct.contains("json"));

    match serde_json::from_str::<Value>(&text) {
        Ok(value) if declared_json || content_type.is_none() => ProbeBody::Json(value),
        // wget-style servers label JSON as text/plain
        Ok(value) if value.is_object() || value.is_array() => ProbeBody::Json(value),
        _ => ProbeBody::Text(text),
    }
}

pub(crate) const TIMED_OUT: &str = "request timed out";

pub(crate) fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        TIMED_OUT.to_string()
    } else if err.is_connect() {
        format!("connection failed ({err})")
    } else {
        err.to_string()
    }
}

pub(crate) fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

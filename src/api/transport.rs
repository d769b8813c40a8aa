// Aerodrome - Jet.com Merchant API Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP transport
//!
//! Executes one [`RequestDescriptor`] and returns one [`ApiResponse`].
//! Nothing here interprets status codes: a 404 is a successful transport
//! round-trip with `success == false`. Errors from this layer are always
//! transport errors (connection, timeout, oversized or broken body) or
//! invalid arguments caught before anything is sent.
//!
//! # Host locking
//!
//! With `lock_host` on, a URL that does not start with `http://` or
//! `https://` is treated as a path on the configured host. With it off, such
//! a URL is rejected.
//!
//! # Size cap
//!
//! Bodies larger than `max_download_size` fail with `ResponseTooLarge`. The
//! declared `Content-Length` is checked first; the body is then read chunk by
//! chunk so a server that lies about (or omits) the length is still cut off.

use crate::api::config::ClientConfig;
use crate::api::pool::{parse_keep_alive, ClientPool};
use crate::error::{AerodromeError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// Supported request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/// Ordered header list.
///
/// Names compare case-insensitively; inserting an existing name replaces the
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`Headers::insert`]
    pub fn with<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One outgoing request; built once, consumed by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: HttpMethod,
    url: String,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl RequestDescriptor {
    /// # Errors
    /// Returns `InvalidArgument` if `url` is empty.
    pub fn new<U: Into<String>>(
        method: HttpMethod,
        url: U,
        headers: Headers,
        body: Option<Vec<u8>>,
    ) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(AerodromeError::invalid_argument("url cannot be empty"));
        }
        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Status and raw body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    status_code: u16,
    body: Vec<u8>,
    success: bool,
}

impl ApiResponse {
    pub fn new(status_code: u16, body: Vec<u8>) -> Self {
        Self {
            status_code,
            body,
            success: (200..300).contains(&status_code),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Parse the body as JSON. Can be called any number of times.
    pub fn json(&self) -> Result<Value> {
        as_structured(&self.body)
    }

    /// Decode the body into a record type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| AerodromeError::decode(e.to_string(), &self.body))
    }
}

/// Parse a raw body as JSON
///
/// # Errors
/// Returns `Decode` carrying the body if it is not valid JSON.
pub fn as_structured(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| AerodromeError::decode(e.to_string(), body))
}

/// Executes requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse>;
}

/// [`HttpTransport`] over reqwest and the shared [`ClientPool`]
pub struct ReqwestTransport {
    pool: Arc<ClientPool>,
    host: String,
    lock_host: bool,
    max_download_size: u64,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_pool(config, ClientPool::new(config))
    }

    pub fn with_pool(config: &ClientConfig, pool: Arc<ClientPool>) -> Self {
        Self {
            pool,
            host: config.host.trim_end_matches('/').to_string(),
            lock_host: config.lock_host,
            max_download_size: config.max_download_size,
        }
    }

    /// The pool this transport draws connections from
    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    /// Apply host locking and parse the result
    pub fn resolve_url(&self, url: &str) -> Result<Url> {
        let target = if has_http_scheme(url) {
            Cow::Borrowed(url)
        } else if self.lock_host {
            let path = url.trim_start_matches('/');
            Cow::Owned(format!("{}/{}", self.host, path))
        } else {
            return Err(AerodromeError::invalid_argument(format!(
                "{} is not an absolute http(s) URL and host locking is off",
                url
            )));
        };

        Url::parse(&target)
            .map_err(|e| AerodromeError::invalid_argument(format!("Invalid URL {}: {}", target, e)))
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn read_body(mut response: reqwest::Response, limit: u64, url: &Url) -> Result<Vec<u8>> {
    let too_large = || AerodromeError::ResponseTooLarge {
        limit,
        url: url.to_string(),
    };

    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
    while let Some(chunk) = response.chunk().await? {
        if body.len() as u64 + chunk.len() as u64 > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let RequestDescriptor {
            method,
            url,
            headers,
            body,
        } = request;

        let url = self.resolve_url(&url)?;
        let mut lease = self.pool.acquire(&url.origin().ascii_serialization())?;

        let mut builder = lease.client().request(method.into(), url.clone());
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, "Request failed");
            AerodromeError::from(e)
        })?;

        let status = response.status().as_u16();
        lease.set_keep_alive(
            response
                .headers()
                .get("keep-alive")
                .and_then(|value| value.to_str().ok())
                .and_then(parse_keep_alive),
        );

        let body = read_body(response, self.max_download_size, &url).await?;
        debug!(status, bytes = body.len(), "Response received");

        Ok(ApiResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn transport(lock_host: bool) -> ReqwestTransport {
        let config = ClientConfig::builder()
            .host("https://merchant-api.jet.com/")
            .username("user")
            .password("secret")
            .lock_host(lock_host)
            .build()
            .unwrap();
        ReqwestTransport::new(&config)
    }

    #[test]
    fn test_lock_host_prefixes_relative_urls() {
        let transport = transport(true);
        assert_eq!(
            transport.resolve_url("/orders/ready").unwrap().as_str(),
            "https://merchant-api.jet.com/orders/ready"
        );
        assert_eq!(
            transport.resolve_url("orders/ready").unwrap().as_str(),
            "https://merchant-api.jet.com/orders/ready"
        );
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let transport = transport(true);
        assert_eq!(
            transport.resolve_url("http://localhost:8080/api/token").unwrap().as_str(),
            "http://localhost:8080/api/token"
        );
    }

    #[test]
    fn test_relative_url_rejected_without_lock_host() {
        let err = transport(false).resolve_url("/orders/ready").unwrap_err();
        assert!(matches!(err, AerodromeError::InvalidArgument(_)));
    }

    #[test]
    fn test_headers_replace_case_insensitively() {
        let mut headers = Headers::new()
            .with("Accept", "text/plain")
            .with("Authorization", "Bearer a");
        headers.insert("accept", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("ACCEPT"), Some("application/json"));
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Accept", "Authorization"]);
    }

    #[test]
    fn test_descriptor_requires_url() {
        assert!(RequestDescriptor::new(HttpMethod::Get, " ", Headers::new(), None).is_err());
    }

    #[test]
    fn test_success_is_2xx_only() {
        assert!(!ApiResponse::new(199, vec![]).is_success());
        assert!(ApiResponse::new(200, vec![]).is_success());
        assert!(ApiResponse::new(204, vec![]).is_success());
        assert!(!ApiResponse::new(301, vec![]).is_success());
        assert!(!ApiResponse::new(404, vec![]).is_success());
    }

    #[test]
    fn test_json_is_repeatable() {
        let response = ApiResponse::new(200, br#"{"sku":"A1","qty":3}"#.to_vec());
        assert_eq!(response.json().unwrap(), response.json().unwrap());
        assert_eq!(response.json().unwrap()["qty"], 3);
    }

    #[test]
    fn test_decode_into_record() {
        #[derive(Debug, Deserialize)]
        struct Price {
            price: f64,
        }

        let response = ApiResponse::new(200, br#"{"price": 9.99}"#.to_vec());
        assert_eq!(response.decode::<Price>().unwrap().price, 9.99);
        assert!(response.decode::<Vec<Price>>().unwrap_err().is_decode_error());
    }

    #[test]
    fn test_as_structured_keeps_bad_body() {
        let err = as_structured(b"<html>").unwrap_err();
        assert!(err.is_decode_error());
        assert_eq!(err.response_body().as_deref(), Some("<html>"));
    }
}

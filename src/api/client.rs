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


//! Request pipeline
//!
//! Every endpoint call goes through [`ApiClient`]. It assembles headers,
//! hands the request to an [`HttpTransport`], and turns a non-2xx status into
//! an `ApiRequestFailed` error that keeps the status code and the raw body.
//! Bodies are never parsed here; callers decode on demand with
//! [`ApiResponse::json`] or [`ApiResponse::decode`].
//!
//! # Headers
//!
//! Two header sets are built fresh for every call, so a token refreshed by
//! the auth flow is picked up by the very next request:
//!
//! - JSON (POST/PUT): `Content-Type` and `Accept` set to `application/json`
//! - plain (GET): `Accept` from config, no `Content-Type`
//!
//! Both carry `Accept-Language` and, while a token is held, `Authorization`.
//!
//! # Example
//! ```rust,no_run
//! use aerodrome::api::client::ApiClient;
//! use aerodrome::api::config::ClientConfig;
//!
//! # async fn example() -> aerodrome::error::Result<()> {
//! let config = ClientConfig::builder()
//!     .host("https://merchant-api.jet.com")
//!     .username("user")
//!     .password("secret")
//!     .build()?;
//! let client = ApiClient::new(config)?;
//!
//! let url = client.config().endpoint_url(&client.config().endpoints.orders_by_status, &[("status", "ready")])?;
//! let orders = client.get_authenticated(&url).await?.json()?;
//! # let _ = orders;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::api::config::ClientConfig;
use crate::api::credentials::CredentialState;
use crate::api::reaper::ConnectionReaper;
use crate::api::transport::{ApiResponse, Headers, HttpMethod, HttpTransport, RequestDescriptor, ReqwestTransport};
use crate::error::{AerodromeError, Result};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Media type for JSON requests and responses
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Pipeline through which every API call passes
pub struct ApiClient {
    config: Arc<ClientConfig>,
    credentials: Arc<CredentialState>,
    transport: Arc<dyn HttpTransport>,
    reaper: Option<ConnectionReaper>,
}

impl ApiClient {
    /// Create a client with the reqwest transport and start its connection
    /// reaper.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the config is invalid or no tokio
    /// runtime is running.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AerodromeError::invalid_argument(
                "ApiClient::new must be called from within a tokio runtime",
            ));
        }

        let credentials = Arc::new(CredentialState::from_config(&config)?);
        let transport = ReqwestTransport::new(&config);
        let reaper = ConnectionReaper::start(transport.pool().clone(), config.reaper);

        Ok(Self {
            config: Arc::new(config),
            credentials,
            transport: Arc::new(transport),
            reaper: Some(reaper),
        })
    }

    /// Create a client over an existing transport and credential state.
    ///
    /// No reaper is started; the transport owns its own connection hygiene.
    pub fn with_transport(
        config: ClientConfig,
        credentials: Arc<CredentialState>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            credentials,
            transport,
            reaper: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialState> {
        &self.credentials
    }

    pub fn reaper(&self) -> Option<&ConnectionReaper> {
        self.reaper.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Stop the connection reaper, if this client started one
    pub async fn shutdown(&self) {
        if let Some(reaper) = &self.reaper {
            reaper.stop().await;
        }
    }

    // ===== Headers =====

    /// Headers for requests carrying a JSON body
    pub fn json_headers(&self) -> Headers {
        let mut headers = Headers::new()
            .with(CONTENT_TYPE.as_str(), JSON_MEDIA_TYPE)
            .with(ACCEPT.as_str(), JSON_MEDIA_TYPE);
        self.add_common_headers(&mut headers);
        headers
    }

    /// Headers for read-only requests
    pub fn plain_headers(&self) -> Headers {
        let mut headers = Headers::new().with(ACCEPT.as_str(), self.config.accept_header.as_str());
        self.add_common_headers(&mut headers);
        headers
    }

    fn add_common_headers(&self, headers: &mut Headers) {
        headers.insert(ACCEPT_LANGUAGE.as_str(), self.config.accept_language_header.as_str());

        let auth = self.credentials.authorization_header_value();
        if !auth.is_empty() {
            headers.insert(AUTHORIZATION.as_str(), auth);
        }
    }

    // ===== Core =====

    /// Run one request and return the response whatever its status
    pub async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
        headers: Headers,
    ) -> Result<ApiResponse> {
        let request = RequestDescriptor::new(method, url, headers, body)?;
        self.transport.execute(request).await
    }

    /// Run one request; a non-2xx status becomes `ApiRequestFailed`
    ///
    /// # Errors
    /// - Transport errors from the underlying transport, as-is
    /// - `ApiRequestFailed` with the status code and verbatim body
    #[instrument(skip(self, method, body, headers), fields(method = %method))]
    pub async fn send(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
        headers: Headers,
    ) -> Result<ApiResponse> {
        let response = self.execute(method, url, body, headers).await?;

        if !response.is_success() {
            let status_code = response.status_code();
            warn!(status = status_code, "API request failed");
            return Err(AerodromeError::api_failed(status_code, response.into_body(), url));
        }

        debug!(status = response.status_code(), "API request succeeded");
        Ok(response)
    }

    // ===== Conveniences =====

    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.send(HttpMethod::Get, url, None, self.plain_headers()).await
    }

    /// POST a value serialized as JSON
    pub async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        let payload = to_json(body)?;
        self.send(HttpMethod::Post, url, Some(payload), self.json_headers()).await
    }

    /// PUT a value serialized as JSON
    pub async fn put_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        let payload = to_json(body)?;
        self.send(HttpMethod::Put, url, Some(payload), self.json_headers()).await
    }

    /// POST an already-serialized JSON payload
    pub async fn post_raw<S: Into<String>>(&self, url: &str, payload: S) -> Result<ApiResponse> {
        let payload = payload.into().into_bytes();
        self.send(HttpMethod::Post, url, Some(payload), self.json_headers()).await
    }

    /// PUT an already-serialized JSON payload
    pub async fn put_raw<S: Into<String>>(&self, url: &str, payload: S) -> Result<ApiResponse> {
        let payload = payload.into().into_bytes();
        self.send(HttpMethod::Put, url, Some(payload), self.json_headers()).await
    }

    // ===== Authenticated variants =====
    // These refuse to go out without a usable token.

    pub async fn get_authenticated(&self, url: &str) -> Result<ApiResponse> {
        self.credentials.test_configuration_data()?;
        self.get(url).await
    }

    pub async fn post_authenticated<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        self.credentials.test_configuration_data()?;
        self.post_json(url, body).await
    }

    pub async fn put_authenticated<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<ApiResponse> {
        self.credentials.test_configuration_data()?;
        self.put_json(url, body).await
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>> {
    serde_json::to_vec(body)
        .map_err(|e| AerodromeError::invalid_argument(format!("Failed to serialize request body: {}", e)))
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .field("reaper", &self.reaper)
            .finish_non_exhaustive()
    }
}

// ===== TESTS =====

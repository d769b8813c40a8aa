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


//! Client configuration
//!
//! Static settings for talking to the marketplace: host, merchant credentials,
//! endpoint URI templates and transport tuning. A [`ClientConfig`] is built
//! once at startup (through [`ClientConfigBuilder`] or deserialized from JSON)
//! and shared read-only afterwards. Mutable authentication data does not live
//! here; see [`crate::api::credentials`].
//!
//! # Endpoint templates
//!
//! Endpoint URIs are relative templates with `{name}` placeholders, e.g.
//! `/merchant-skus/{sku}/price`. [`Endpoints::expand`] substitutes
//! URL-encoded values and refuses to return a URI that still contains a
//! placeholder. [`ClientConfig::build_url`] prefixes the host.

use crate::api::reaper::ReaperConfig;
use crate::error::{AerodromeError, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Default read timeout (10 seconds)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default cap on a response body (2 MiB)
pub const DEFAULT_MAX_DOWNLOAD_SIZE: u64 = 1024 * 2048;

pub const DEFAULT_ACCEPT_HEADER: &str = "application/json";

pub const DEFAULT_ACCEPT_LANGUAGE_HEADER: &str = "en-US,en;q=0.5";

pub const DEFAULT_USER_AGENT: &str = concat!("aerodrome/", env!("CARGO_PKG_VERSION"));

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder pattern");
}

/// Relative URI templates for every marketplace endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// POST username/password, receive a token
    pub authentication: String,
    /// GET; answers `"This message is authorized."` for a valid token
    pub auth_test: String,

    // ===== Products =====
    pub archive_sku: String,
    pub product: String,
    pub product_image: String,
    pub product_price: String,
    pub product_inventory: String,
    pub product_shipping_exception: String,
    pub product_returns_exception: String,
    pub product_variation: String,
    pub sku_list: String,
    pub product_sales_data: String,

    // ===== Bulk uploads =====
    pub bulk_upload_token: String,
    pub bulk_file_status: String,
    pub bulk_uploaded_files: String,

    // ===== Orders =====
    pub orders_by_status: String,
    pub order_directed_cancel: String,
    pub order_detail: String,
    pub order_acknowledge: String,
    pub order_shipped: String,

    // ===== Returns =====
    pub returns_by_status: String,
    pub return_detail: String,
    pub return_complete: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authentication: "/api/token".to_string(),
            auth_test: "/api/authcheck".to_string(),
            archive_sku: "/merchant-skus/{sku}/status/archive".to_string(),
            product: "/merchant-skus/{sku}".to_string(),
            product_image: "/merchant-skus/{sku}/image".to_string(),
            product_price: "/merchant-skus/{sku}/price".to_string(),
            product_inventory: "/merchant-skus/{sku}/inventory".to_string(),
            product_shipping_exception: "/merchant-skus/{sku}/shippingexception".to_string(),
            product_returns_exception: "/merchant-skus/{sku}/returnsexception".to_string(),
            product_variation: "/merchant-skus/{sku}/variation".to_string(),
            sku_list: "/merchant-skus?offset={offset}&limit={limit}".to_string(),
            product_sales_data: "/merchant-skus/{sku}/salesdata".to_string(),
            bulk_upload_token: "/files/uploadToken".to_string(),
            bulk_file_status: "/files/{file_id}".to_string(),
            bulk_uploaded_files: "/files/uploaded".to_string(),
            orders_by_status: "/orders/{status}".to_string(),
            order_directed_cancel: "/orders/directedCancel".to_string(),
            order_detail: "/orders/withoutShipmentDetail/{order_id}".to_string(),
            order_acknowledge: "/orders/{order_id}/acknowledge".to_string(),
            order_shipped: "/orders/{order_id}/shipped".to_string(),
            returns_by_status: "/returns/{status}".to_string(),
            return_detail: "/returns/state/{return_id}".to_string(),
            return_complete: "/returns/{return_id}/complete".to_string(),
        }
    }
}

impl Endpoints {
    /// Substitute `{name}` placeholders in `template`.
    ///
    /// Values are percent-encoded. Unknown parameters are ignored.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if a placeholder has no matching parameter.
    pub fn expand(template: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut missing = Vec::new();

        let expanded = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match params.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => urlencoding::encode(value).into_owned(),
                None => {
                    missing.push(name.to_string());
                    caps[0].to_string()
                }
            }
        });

        if !missing.is_empty() {
            return Err(AerodromeError::invalid_argument(format!(
                "Unresolved placeholder(s) {} in {}",
                missing.join(", "),
                template
            )));
        }

        Ok(expanded.into_owned())
    }
}

/// Static configuration for an [`crate::api::client::ApiClient`]
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and host, e.g. `https://merchant-api.jet.com`
    pub host: String,
    pub username: String,
    pub password: String,
    pub merchant_id: String,
    pub endpoints: Endpoints,

    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Accept header for plain (non-JSON) requests
    pub accept_header: String,
    pub accept_language_header: String,
    pub user_agent: String,

    /// Accept self-signed and otherwise untrusted TLS certificates
    pub allow_untrusted_ssl: bool,

    /// Rewrite scheme-less URLs to target `host`
    pub lock_host: bool,

    /// Largest response body accepted, in bytes
    pub max_download_size: u64,

    /// Keep-alive applied to a pooled connection when the server does not
    /// advertise one. `None` keeps connections until they go idle.
    #[serde(with = "duration_ms::option")]
    pub keep_alive: Option<Duration>,

    pub reaper: ReaperConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            merchant_id: String::new(),
            endpoints: Endpoints::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            accept_header: DEFAULT_ACCEPT_HEADER.to_string(),
            accept_language_header: DEFAULT_ACCEPT_LANGUAGE_HEADER.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allow_untrusted_ssl: false,
            lock_host: true,
            max_download_size: DEFAULT_MAX_DOWNLOAD_SIZE,
            keep_alive: None,
            reaper: ReaperConfig::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"*****")
            .field("merchant_id", &self.merchant_id)
            .field("endpoints", &self.endpoints)
            .field("read_timeout", &self.read_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("allow_untrusted_ssl", &self.allow_untrusted_ssl)
            .field("lock_host", &self.lock_host)
            .field("max_download_size", &self.max_download_size)
            .field("keep_alive", &self.keep_alive)
            .field("reaper", &self.reaper)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Check required fields.
    ///
    /// Called by [`ClientConfigBuilder::build`]; call it directly on a
    /// deserialized config.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
            ("endpoints.authentication", &self.endpoints.authentication),
            ("endpoints.auth_test", &self.endpoints.auth_test),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AerodromeError::invalid_argument(format!("{} cannot be empty", name)));
            }
        }

        let parsed = url::Url::parse(&self.host)
            .map_err(|e| AerodromeError::invalid_argument(format!("host {}: {}", self.host, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AerodromeError::invalid_argument(format!(
                "host {} must use http or https",
                self.host
            )));
        }

        if self.max_download_size == 0 {
            return Err(AerodromeError::invalid_argument("max_download_size must be positive"));
        }

        let durations = [
            ("read_timeout", self.read_timeout),
            ("connect_timeout", self.connect_timeout),
            ("reaper.interval", self.reaper.interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(AerodromeError::invalid_argument(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }

    /// Prefix a relative URI with the configured host
    pub fn build_url(&self, uri: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), uri)
    }

    pub fn authentication_url(&self) -> String {
        self.build_url(&self.endpoints.authentication)
    }

    pub fn auth_test_url(&self) -> String {
        self.build_url(&self.endpoints.auth_test)
    }

    /// Expand an endpoint template and prefix the host
    pub fn endpoint_url(&self, template: &str, params: &[(&str, &str)]) -> Result<String> {
        Ok(self.build_url(&Endpoints::expand(template, params)?))
    }
}

/// Builder for ClientConfig
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        debug!(host = %self.config.host, "Using host");
        self
    }

    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.config.username = username.into();
        debug!(username = %self.config.username, "Using user");
        self
    }

    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.config.password = password.into();
        debug!("Using pass: *****");
        self
    }

    pub fn merchant_id<S: Into<String>>(mut self, merchant_id: S) -> Self {
        self.config.merchant_id = merchant_id.into();
        debug!(merchant_id = %self.config.merchant_id, "Using merchant id");
        self
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.config.endpoints = endpoints;
        debug!(authentication = %self.config.endpoints.authentication, "Endpoints set");
        self
    }

    /// URI for authenticating username/password and retrieving a token
    pub fn authentication_uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.config.endpoints.authentication = uri.into();
        debug!(uri = %self.config.endpoints.authentication, "Authentication URI set");
        self
    }

    /// URI for testing the token retrieved during authentication
    pub fn auth_test_uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.config.endpoints.auth_test = uri.into();
        debug!(uri = %self.config.endpoints.auth_test, "Authentication test URI set");
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        debug!(?timeout, "Read timeout set");
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        debug!(?timeout, "Connect timeout set");
        self
    }

    pub fn accept_header<S: Into<String>>(mut self, value: S) -> Self {
        self.config.accept_header = value.into();
        debug!(value = %self.config.accept_header, "Accept header set");
        self
    }

    pub fn accept_language_header<S: Into<String>>(mut self, value: S) -> Self {
        self.config.accept_language_header = value.into();
        debug!(value = %self.config.accept_language_header, "Accept-Language header set");
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        debug!(user_agent = %self.config.user_agent, "User agent set");
        self
    }

    pub fn allow_untrusted_ssl(mut self, allow: bool) -> Self {
        self.config.allow_untrusted_ssl = allow;
        debug!(allow, "allowUntrustedSSL set");
        self
    }

    pub fn lock_host(mut self, on: bool) -> Self {
        self.config.lock_host = on;
        debug!(on, "lockHost set");
        self
    }

    pub fn max_download_size(mut self, size: u64) -> Self {
        self.config.max_download_size = size;
        debug!(size, "maxDownloadSize set");
        self
    }

    pub fn keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.config.keep_alive = keep_alive;
        debug!(?keep_alive, "Keep-alive fallback set");
        self
    }

    pub fn reaper(mut self, reaper: ReaperConfig) -> Self {
        self.config.reaper = reaper;
        debug!(interval = ?reaper.interval, idle_timeout = ?reaper.idle_timeout, "Reaper timing set");
        self
    }

    /// Validate and return the config
    ///
    /// # Errors
    /// Returns `InvalidArgument` when a required field is empty, the host
    /// is not an http(s) URL, or a timeout or the reaper interval is zero.
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Durations serialized as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_builder() -> ClientConfigBuilder {
        ClientConfig::builder()
            .host("https://merchant-api.jet.com")
            .username("user")
            .password("secret")
            .merchant_id("merchant")
    }

    #[test]
    fn test_defaults() {
        let config = valid_builder().build().unwrap();
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.max_download_size, 2 * 1024 * 1024);
        assert_eq!(config.accept_header, "application/json");
        assert!(config.lock_host);
        assert!(!config.allow_untrusted_ssl);
        assert_eq!(config.reaper.interval, Duration::from_secs(5));
        assert_eq!(config.reaper.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_applies_transport_settings() {
        let endpoints = Endpoints {
            authentication: "/token".to_string(),
            ..Endpoints::default()
        };
        let config = valid_builder()
            .endpoints(endpoints)
            .connect_timeout(Duration::from_secs(3))
            .accept_header("text/plain")
            .accept_language_header("nb-NO")
            .user_agent("merchant-sync/2.0")
            .keep_alive(Some(Duration::from_secs(15)))
            .reaper(ReaperConfig {
                interval: Duration::from_secs(1),
                idle_timeout: Duration::from_secs(10),
            })
            .build()
            .unwrap();

        assert_eq!(config.authentication_url(), "https://merchant-api.jet.com/token");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.accept_header, "text/plain");
        assert_eq!(config.accept_language_header, "nb-NO");
        assert_eq!(config.user_agent, "merchant-sync/2.0");
        assert_eq!(config.keep_alive, Some(Duration::from_secs(15)));
        assert_eq!(config.reaper.idle_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_build_requires_credentials() {
        let err = ClientConfig::builder()
            .host("https://merchant-api.jet.com")
            .username("user")
            .build()
            .unwrap_err();
        assert!(matches!(err, AerodromeError::InvalidArgument(ref m) if m.contains("password")));
    }

    #[test]
    fn test_build_requires_scheme_on_host() {
        let err = valid_builder().host("merchant-api.jet.com").build().unwrap_err();
        assert!(matches!(err, AerodromeError::InvalidArgument(_)));
    }

    #[test]
    fn test_build_rejects_zero_durations() {
        let err = valid_builder()
            .reaper(ReaperConfig {
                interval: Duration::ZERO,
                ..ReaperConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, AerodromeError::InvalidArgument(ref m) if m.contains("reaper.interval")));

        let err = valid_builder().read_timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, AerodromeError::InvalidArgument(ref m) if m.contains("read_timeout")));

        let err = valid_builder().connect_timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, AerodromeError::InvalidArgument(ref m) if m.contains("connect_timeout")));

        let json = r#"{
            "host": "https://merchant-api.jet.com",
            "username": "user",
            "password": "secret",
            "reaper": { "interval": 0 }
        }"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_url_joins_host_and_uri() {
        let config = valid_builder().host("https://merchant-api.jet.com/").build().unwrap();
        assert_eq!(config.authentication_url(), "https://merchant-api.jet.com/api/token");
        assert_eq!(config.auth_test_url(), "https://merchant-api.jet.com/api/authcheck");
    }

    #[test]
    fn test_expand_encodes_values() {
        let uri = Endpoints::expand("/merchant-skus/{sku}/price", &[("sku", "A B/1")]).unwrap();
        assert_eq!(uri, "/merchant-skus/A%20B%2F1/price");
    }

    #[test]
    fn test_expand_rejects_unresolved_placeholders() {
        let err = Endpoints::expand("/merchant-skus?offset={offset}&limit={limit}", &[("offset", "0")])
            .unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_endpoint_url() {
        let config = valid_builder().build().unwrap();
        let url = config
            .endpoint_url(&config.endpoints.order_shipped, &[("order_id", "abc123")])
            .unwrap();
        assert_eq!(url, "https://merchant-api.jet.com/orders/abc123/shipped");
    }

    #[test]
    fn test_debug_masks_password() {
        let config = valid_builder().build().unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("*****"));
    }

    #[test]
    fn test_deserialize_with_partial_fields() {
        let json = r#"{
            "host": "https://merchant-api.jet.com",
            "username": "user",
            "password": "secret",
            "read_timeout": 2500,
            "keep_alive": 15000,
            "endpoints": { "auth_test": "/api/ping" }
        }"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.read_timeout, Duration::from_millis(2500));
        assert_eq!(config.keep_alive, Some(Duration::from_secs(15)));
        assert_eq!(config.endpoints.auth_test, "/api/ping");
        assert_eq!(config.endpoints.authentication, "/api/token");
    }
}

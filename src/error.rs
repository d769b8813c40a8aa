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


//! Error types for Aerodrome
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Variants are grouped into five categories, and every variant belongs to
//! exactly one of them:
//!
//! - **Transport**: the request never produced a usable HTTP response
//!   (connection refused, timeout, oversized body, broken framing)
//! - **Protocol**: the server answered, but not with success, or the
//!   authentication response lacked required fields
//! - **Auth**: the local credential state cannot be used for a request
//! - **Decode**: a response body could not be parsed into the requested shape
//! - **InvalidArgument**: the caller handed in something structurally invalid;
//!   always raised before any network activity
//!
//! Nothing in the pipeline retries. Use [`AerodromeError::kind`] to branch on
//! the category instead of matching every variant.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias using our AerodromeError type
pub type Result<T> = std::result::Result<T, AerodromeError>;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Auth,
    Decode,
    InvalidArgument,
}

/// Main error type for Aerodrome
#[derive(Error, Debug)]
pub enum AerodromeError {
    // ===== Transport Errors =====

    /// Could not connect to the remote host, or the connection dropped
    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        /// URL that was being requested, if known
        url: Option<String>,
    },

    /// Connect or read timeout elapsed
    #[error("Request timed out: {message}")]
    Timeout {
        message: String,
        url: Option<String>,
    },

    /// Response body exceeded the configured maximum download size
    #[error("Response body from {url} exceeds the maximum size of {limit} bytes")]
    ResponseTooLarge {
        limit: u64,
        url: String,
    },

    /// Response could not be read as HTTP (framing, truncated body, bad encoding)
    #[error("Malformed HTTP response: {message}")]
    MalformedResponse {
        message: String,
        url: Option<String>,
    },

    // ===== Protocol Errors =====

    /// Server returned a non-2xx status code.
    /// The body is kept byte for byte; meaning depends on the endpoint.
    #[error("API request to {endpoint} failed with status {status_code}")]
    ApiRequestFailed {
        status_code: u16,
        body: Vec<u8>,
        endpoint: String,
    },

    /// Authentication succeeded at the HTTP level but the response lacked
    /// id_token, token_type or expires_on
    #[error("Malformed authentication response: {message}")]
    MalformedAuthResponse {
        message: String,
        body: String,
    },

    // ===== Auth Errors =====

    /// No token is held
    #[error("Not authenticated (not logged in to the Jet.com API)")]
    NotAuthenticated,

    /// Token is held but its expiry has passed
    #[error("Authorization expired at {expired_at}")]
    TokenExpired {
        expired_at: DateTime<Utc>,
    },

    /// Credential state is internally inconsistent
    #[error("Invalid authentication state: {0}")]
    InvalidAuthState(String),

    // ===== Decode Errors =====

    /// Body is not valid JSON, or does not match the requested record type
    #[error("Failed to decode response body: {message}")]
    Decode {
        message: String,
        /// Raw body for debugging
        body: String,
    },

    // ===== Argument Errors =====

    /// Structurally invalid input (empty required string, unparseable timestamp, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<reqwest::Error> for AerodromeError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string());
        let message = err.to_string();

        if err.is_timeout() {
            AerodromeError::Timeout { message, url }
        } else if err.is_builder() {
            AerodromeError::InvalidArgument(message)
        } else if err.is_body() || err.is_decode() {
            AerodromeError::MalformedResponse { message, url }
        } else {
            AerodromeError::Connection { message, url }
        }
    }
}

// Helper methods for creating common errors
impl AerodromeError {
    /// Create an InvalidArgument error with a message
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        AerodromeError::InvalidArgument(message.into())
    }

    /// Create an ApiRequestFailed error
    pub fn api_failed<B: Into<Vec<u8>>, E: Into<String>>(
        status_code: u16,
        body: B,
        endpoint: E,
    ) -> Self {
        AerodromeError::ApiRequestFailed {
            status_code,
            body: body.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Create a Decode error from a parser error and the offending body
    pub fn decode<S: Into<String>>(message: S, body: &[u8]) -> Self {
        AerodromeError::Decode {
            message: message.into(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// Taxonomy category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AerodromeError::Connection { .. }
            | AerodromeError::Timeout { .. }
            | AerodromeError::ResponseTooLarge { .. }
            | AerodromeError::MalformedResponse { .. } => ErrorKind::Transport,
            AerodromeError::ApiRequestFailed { .. }
            | AerodromeError::MalformedAuthResponse { .. } => ErrorKind::Protocol,
            AerodromeError::NotAuthenticated
            | AerodromeError::TokenExpired { .. }
            | AerodromeError::InvalidAuthState(_) => ErrorKind::Auth,
            AerodromeError::Decode { .. } => ErrorKind::Decode,
            AerodromeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_protocol_error(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Check if error is due to missing or expired credentials
    pub fn is_auth_error(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    pub fn is_decode_error(&self) -> bool {
        self.kind() == ErrorKind::Decode
    }

    /// HTTP status code carried by protocol errors
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AerodromeError::ApiRequestFailed { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Response body carried by protocol and decode errors, as text.
    /// Invalid UTF-8 in a failed request's body is replaced with U+FFFD.
    pub fn response_body(&self) -> Option<Cow<'_, str>> {
        match self {
            AerodromeError::ApiRequestFailed { body, .. } => Some(String::from_utf8_lossy(body)),
            AerodromeError::MalformedAuthResponse { body, .. }
            | AerodromeError::Decode { body, .. } => Some(Cow::Borrowed(body)),
            _ => None,
        }
    }

    /// Response body bytes as received, for errors that carry one
    pub fn raw_response_body(&self) -> Option<&[u8]> {
        match self {
            AerodromeError::ApiRequestFailed { body, .. } => Some(body),
            AerodromeError::MalformedAuthResponse { body, .. }
            | AerodromeError::Decode { body, .. } => Some(body.as_bytes()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_variants() {
        let timeout = AerodromeError::Timeout { message: "read".into(), url: None };
        assert_eq!(timeout.kind(), ErrorKind::Transport);
        assert!(timeout.is_transport_error());

        let failed = AerodromeError::api_failed(404, "nope", "/product/1");
        assert_eq!(failed.kind(), ErrorKind::Protocol);
        assert_eq!(failed.status_code(), Some(404));
        assert_eq!(failed.response_body().as_deref(), Some("nope"));

        assert!(AerodromeError::NotAuthenticated.is_auth_error());
        assert!(AerodromeError::decode("eof", b"{").is_decode_error());
        assert_eq!(
            AerodromeError::invalid_argument("token can't be empty").kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_failed_request_keeps_non_utf8_body() {
        let err = AerodromeError::api_failed(502, vec![b'o', b'k', 0xff, 0xfe], "/orders/ready");
        assert_eq!(err.raw_response_body(), Some(&[b'o', b'k', 0xff, 0xfe][..]));
        assert_eq!(err.response_body().as_deref(), Some("ok\u{fffd}\u{fffd}"));
    }

    #[test]
    fn test_transport_errors_carry_no_status() {
        let err = AerodromeError::ResponseTooLarge { limit: 10, url: "http://x".into() };
        assert_eq!(err.status_code(), None);
        assert_eq!(err.response_body(), None);
        assert_eq!(err.raw_response_body(), None);
    }

    #[test]
    fn test_expired_message_includes_time() {
        let at = DateTime::parse_from_rfc3339("2016-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = AerodromeError::TokenExpired { expired_at: at };
        assert!(err.to_string().contains("2016-05-01 12:00:00"));
    }
}

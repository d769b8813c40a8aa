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


//! Credential state
//!
//! Holds the merchant login (host, username, password) and the token issued
//! by the API after a successful login. One instance is created at startup
//! and shared, via `Arc`, by the request pipeline and the auth flow.
//!
//! # Concurrency
//!
//! Token data lives in an immutable [`TokenSnapshot`] behind an `ArcSwap`.
//! Readers (every outgoing request) load the current snapshot without
//! locking; writers (`set_authentication_data`, `clear_authentication_data`)
//! serialize on a mutex and publish a whole new snapshot, so a reader never
//! sees a token paired with the wrong type or header value.
//!
//! # Invariants
//!
//! - `authorization_header_value == token_type + " " + token` while a token
//!   is held, and empty otherwise.
//! - `is_authenticated()` holds iff a token is held and now < expiry.

use crate::api::config::ClientConfig;
use crate::api::date::parse_token_expiry;
use crate::error::{AerodromeError, Result};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable view of the token data at one point in time
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSnapshot {
    token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
    authorization_header_value: String,
}

impl TokenSnapshot {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            token: String::new(),
            token_type: String::new(),
            expires_at: now,
            authorization_header_value: String::new(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for the `Authorization` header; empty when no token is held
    pub fn authorization_header_value(&self) -> &str {
        &self.authorization_header_value
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.has_token() && now < self.expires_at
    }
}

impl fmt::Debug for TokenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSnapshot")
            .field("token", &mask(&self.token))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Merchant credentials plus the current API token
pub struct CredentialState {
    host: String,
    username: String,
    password: String,
    current: ArcSwap<TokenSnapshot>,
    writer: Mutex<()>,
}

impl CredentialState {
    /// Create an unauthenticated credential state
    ///
    /// # Errors
    /// Returns `InvalidArgument` if any argument is empty.
    pub fn new<H, U, P>(host: H, username: U, password: P) -> Result<Self>
    where
        H: Into<String>,
        U: Into<String>,
        P: Into<String>,
    {
        let host = host.into();
        let username = username.into();
        let password = password.into();

        for (name, value) in [("host", &host), ("username", &username), ("password", &password)] {
            if value.trim().is_empty() {
                return Err(AerodromeError::invalid_argument(format!("{} cannot be empty", name)));
            }
        }

        Ok(Self {
            host,
            username,
            password,
            current: ArcSwap::from_pointee(TokenSnapshot::empty(Utc::now())),
            writer: Mutex::new(()),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.host.as_str(), config.username.as_str(), config.password.as_str())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Current token data; cheap, lock-free
    pub fn snapshot(&self) -> Arc<TokenSnapshot> {
        self.current.load_full()
    }

    pub fn authorization_header_value(&self) -> String {
        self.current.load().authorization_header_value.clone()
    }

    /// Store the token fields returned by a successful login.
    ///
    /// `expires_at` must be in `yyyy-MM-ddTHH:mm:ssZ` form (UTC).
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `token` or `token_type` is empty or
    /// `expires_at` does not parse. State is unchanged on error.
    pub fn set_authentication_data(&self, token: &str, token_type: &str, expires_at: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(AerodromeError::invalid_argument("token can't be empty"));
        }
        if token_type.trim().is_empty() {
            return Err(AerodromeError::invalid_argument("tokenType can't be empty"));
        }
        let expires_at = parse_token_expiry(expires_at)?;

        let next = TokenSnapshot {
            token: token.to_string(),
            token_type: token_type.to_string(),
            expires_at,
            authorization_header_value: format!("{} {}", token_type, token),
        };

        let _guard = self.writer.lock();
        self.current.store(Arc::new(next));
        info!(token = %mask(token), token_type, %expires_at, "Authentication data set");
        Ok(())
    }

    /// Forget the token; afterwards `is_authenticated()` is false
    pub fn clear_authentication_data(&self) {
        let _guard = self.writer.lock();
        self.current.store(Arc::new(TokenSnapshot::empty(Utc::now())));
        debug!("Authentication data cleared");
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.current.load().is_authenticated_at(now)
    }

    /// Diagnose why the state is not usable for authenticated requests.
    ///
    /// # Errors
    /// - `NotAuthenticated` when no token is held
    /// - `TokenExpired` when the expiry is in the past
    /// - `InvalidAuthState` when the stored header value disagrees with the token
    pub fn test_configuration_data(&self) -> Result<()> {
        self.test_configuration_data_at(Utc::now())
    }

    pub fn test_configuration_data_at(&self, now: DateTime<Utc>) -> Result<()> {
        let snapshot = self.current.load();

        if !snapshot.has_token() {
            return Err(AerodromeError::NotAuthenticated);
        }
        if snapshot.expires_at < now {
            return Err(AerodromeError::TokenExpired {
                expired_at: snapshot.expires_at,
            });
        }
        let expected = format!("{} {}", snapshot.token_type, snapshot.token);
        if snapshot.token_type.is_empty() || snapshot.authorization_header_value != expected {
            return Err(AerodromeError::InvalidAuthState(
                "authorization header does not match the stored token".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"*****")
            .field("token", &*self.current.load_full())
            .finish()
    }
}

/// Mask a secret for logging
///
/// Shows first 2 and last 2 characters, replaces middle with asterisks
pub(crate) fn mask(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.is_empty() {
        "[empty]".to_string()
    } else if chars.len() <= 4 {
        "****".to_string()
    } else {
        let first_two: String = chars.iter().take(2).collect();
        let last_two: String = chars.iter().skip(chars.len() - 2).collect();
        format!("{}{}{}", first_two, "*".repeat(chars.len() - 4), last_two)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state() -> CredentialState {
        CredentialState::new("https://merchant-api.jet.com", "user", "secret").unwrap()
    }

    fn format_expiry(at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    #[test]
    fn test_new_state_is_unauthenticated() {
        let state = state();
        assert!(!state.is_authenticated());
        assert_eq!(state.authorization_header_value(), "");
        assert!(matches!(state.test_configuration_data(), Err(AerodromeError::NotAuthenticated)));
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        assert!(CredentialState::new("", "user", "pass").is_err());
        assert!(CredentialState::new("https://h", " ", "pass").is_err());
        assert!(CredentialState::new("https://h", "user", "").is_err());
    }

    #[test]
    fn test_set_authentication_data_builds_header() {
        let state = state();
        state.set_authentication_data("abc", "Bearer", "2030-01-01T00:00:00Z").unwrap();

        assert_eq!(state.authorization_header_value(), "Bearer abc");
        let snapshot = state.snapshot();
        assert_eq!(snapshot.token(), "abc");
        assert_eq!(snapshot.token_type(), "Bearer");
        assert_eq!(format_expiry(snapshot.expires_at()), "2030-01-01T00:00:00Z");
        assert!(state.is_authenticated());
        state.test_configuration_data().unwrap();
    }

    #[test]
    fn test_set_authentication_data_in_past_is_not_authenticated() {
        let state = state();
        state.set_authentication_data("abc", "Bearer", "2016-05-01T12:00:00Z").unwrap();

        assert_eq!(state.authorization_header_value(), "Bearer abc");
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_set_authentication_data_rejects_bad_input() {
        let state = state();
        let bad = [
            ("", "Bearer", "2030-01-01T00:00:00Z"),
            ("abc", "  ", "2030-01-01T00:00:00Z"),
            ("abc", "Bearer", "2030-01-01 00:00:00"),
            ("abc", "Bearer", "2030-01-01T00:00:00.5Z"),
        ];
        for (token, token_type, expires) in bad {
            let err = state.set_authentication_data(token, token_type, expires).unwrap_err();
            assert!(matches!(err, AerodromeError::InvalidArgument(_)), "{:?}", err);
        }
        assert!(!state.snapshot().has_token());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let state = state();
        state.set_authentication_data("abc", "Bearer", "2030-01-01T00:00:00Z").unwrap();

        state.clear_authentication_data();
        assert!(!state.is_authenticated());
        assert_eq!(state.authorization_header_value(), "");

        state.clear_authentication_data();
        assert!(!state.is_authenticated());
        assert_eq!(state.snapshot().token(), "");
    }

    #[test]
    fn test_expired_token_fails_configuration_test() {
        let state = state();
        let now = Utc::now();
        let expires = now + Duration::hours(1);
        state
            .set_authentication_data("abc", "Bearer", &format_expiry(expires))
            .unwrap();

        // Clock moved to one second past expiry
        let later = state.snapshot().expires_at() + Duration::seconds(1);
        let err = state.test_configuration_data_at(later).unwrap_err();
        assert!(matches!(err, AerodromeError::TokenExpired { .. }));
        assert!(err.to_string().starts_with("Authorization expired at"));
        assert!(!state.is_authenticated_at(later));
    }

    #[test]
    fn test_snapshot_survives_later_writes() {
        let state = state();
        state.set_authentication_data("first", "Bearer", "2030-01-01T00:00:00Z").unwrap();
        let held = state.snapshot();

        state.set_authentication_data("second", "MAC", "2031-01-01T00:00:00Z").unwrap();
        assert_eq!(held.authorization_header_value(), "Bearer first");
        assert_eq!(state.authorization_header_value(), "MAC second");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let state = state();
        state
            .set_authentication_data("abcdefghijkl", "Bearer", "2030-01-01T00:00:00Z")
            .unwrap();
        let printed = format!("{:?}", state);
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("abcdefghijkl"));
        assert!(printed.contains("ab********kl"));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(""), "[empty]");
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("abcdef"), "ab**ef");
    }
}

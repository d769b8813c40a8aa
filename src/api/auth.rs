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


//! Authentication flow
//!
//! Logs in to the marketplace API with the merchant's username and password
//! and stores the issued token in the shared [`CredentialState`].
//!
//! # Login sequence
//!
//! 1. POST `{"user": ..., "pass": ...}` to the authentication endpoint.
//! 2. Read `id_token`, `token_type` and `expires_on` from the JSON answer.
//!    A missing or empty field is a `MalformedAuthResponse`.
//! 3. Store them with `set_authentication_data`, then check the stored state
//!    with `test_configuration_data`.
//! 4. Probe: GET the auth-test endpoint. The server answers a valid token
//!    with the JSON string `"This message is authorized."`, quotes included.
//!    Any other answer (including a non-2xx status) clears the credentials,
//!    and so does an auth test that fails to complete.
//!
//! A rejected probe is not an error: [`Authenticator::login`] returns
//! [`LoginOutcome::ProbeRejected`]. Errors are reserved for transport
//! failures, a failed token request and malformed token responses.
//!
//! # Concurrent logins
//!
//! Logins are single-flight. A caller that arrives while a login is running
//! waits for it and receives the same outcome instead of starting its own.
//! Only outcomes are shared; if the running attempt fails with an error, a
//! waiter makes its own attempt.

use crate::api::client::ApiClient;
use crate::api::credentials::CredentialState;
use crate::api::transport::HttpMethod;
use crate::error::{AerodromeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Exact body returned by the auth-test endpoint for a valid token
pub const AUTH_TEST_RESPONSE: &str = "\"This message is authorized.\"";

/// Where the auth flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// A login is in flight
    Authenticating,
    Authenticated,
}

/// Result of a completed login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Token issued and accepted by the probe
    Authenticated,
    /// Token issued but the probe did not confirm it; credentials were cleared
    ProbeRejected {
        status_code: u16,
        body: String,
    },
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    pass: &'a str,
}

/// Drives login and the liveness probe over an [`ApiClient`]
#[derive(Debug)]
pub struct Authenticator {
    client: Arc<ApiClient>,
    /// Held for the duration of a login; stores the last shared outcome
    flight: Mutex<Option<LoginOutcome>>,
    /// Bumped each time a login finishes
    completed: AtomicU64,
    in_flight: AtomicBool,
}

impl Authenticator {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            flight: Mutex::new(None),
            completed: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    fn credentials(&self) -> &CredentialState {
        self.client.credentials()
    }

    pub fn state(&self) -> AuthState {
        if self.in_flight.load(Ordering::SeqCst) {
            AuthState::Authenticating
        } else if self.credentials().is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_authenticated()
    }

    /// Log in and verify the issued token
    ///
    /// # Returns
    /// `Authenticated` when the probe confirms the token, `ProbeRejected`
    /// otherwise. Credential state matches the outcome on return.
    ///
    /// # Errors
    /// - Transport errors from either request
    /// - `ApiRequestFailed` if the token request is answered with non-2xx
    /// - `MalformedAuthResponse` if the token response lacks a field
    /// - `InvalidArgument` if `expires_on` is not `yyyy-MM-ddTHH:mm:ssZ`
    pub async fn login(&self) -> Result<LoginOutcome> {
        let seen = self.completed.load(Ordering::SeqCst);
        let mut last = self.flight.lock().await;

        if self.completed.load(Ordering::SeqCst) != seen {
            if let Some(outcome) = last.as_ref() {
                debug!("Joined concurrent login");
                return Ok(outcome.clone());
            }
        }

        let result = {
            let _flag = InFlight::set(&self.in_flight);
            self.attempt().await
        };

        *last = result.as_ref().ok().cloned();
        self.completed.fetch_add(1, Ordering::SeqCst);

        result
    }

    #[instrument(skip(self), fields(user = %self.credentials().username()))]
    async fn attempt(&self) -> Result<LoginOutcome> {
        let config = self.client.config();
        let credentials = self.credentials();

        info!("Logging in to the Jet.com API");
        let request = LoginRequest {
            user: credentials.username(),
            pass: credentials.password(),
        };
        let response = self.client.post_json(&config.authentication_url(), &request).await?;

        let body = response.text().into_owned();
        let value = response.json().map_err(|_| AerodromeError::MalformedAuthResponse {
            message: "response is not JSON".to_string(),
            body: body.clone(),
        })?;

        let token = required_field(&value, "id_token", &body)?;
        let token_type = required_field(&value, "token_type", &body)?;
        let expires_on = required_field(&value, "expires_on", &body)?;

        credentials.set_authentication_data(token, token_type, expires_on)?;
        credentials.test_configuration_data()?;

        let check = match self
            .client
            .execute(HttpMethod::Get, &config.auth_test_url(), None, self.client.plain_headers())
            .await
        {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "Authentication test did not complete; clearing credentials");
                credentials.clear_authentication_data();
                return Err(e);
            }
        };

        if is_authorized(check.status_code(), check.body()) {
            info!("Authentication confirmed");
            Ok(LoginOutcome::Authenticated)
        } else {
            warn!(status = check.status_code(), "Authentication test failed; clearing credentials");
            credentials.clear_authentication_data();
            Ok(LoginOutcome::ProbeRejected {
                status_code: check.status_code(),
                body: check.text().into_owned(),
            })
        }
    }

    /// Check the current token against the auth-test endpoint
    ///
    /// Unlike `login`, a rejection leaves the credential state alone.
    ///
    /// # Errors
    /// Transport errors only.
    pub async fn auth_test(&self) -> Result<bool> {
        let response = self
            .client
            .execute(
                HttpMethod::Get,
                &self.client.config().auth_test_url(),
                None,
                self.client.plain_headers(),
            )
            .await?;
        Ok(is_authorized(response.status_code(), response.body()))
    }
}

/// Raises the in-flight flag; lowered on drop, including when the login
/// future is dropped mid-request
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn is_authorized(status_code: u16, body: &[u8]) -> bool {
    (200..300).contains(&status_code) && body == AUTH_TEST_RESPONSE.as_bytes()
}

fn required_field<'a>(value: &'a Value, name: &str, body: &str) -> Result<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AerodromeError::MalformedAuthResponse {
            message: format!("missing {}", name),
            body: body.to_string(),
        })
}

// ===== TESTS =====

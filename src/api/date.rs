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


//! Date formats used on the wire
//!
//! Two formats show up in API traffic:
//!
//! - Token expiry (`expires_on` in the auth response): `yyyy-MM-ddTHH:mm:ssZ`,
//!   always UTC, no fractional seconds.
//! - Everything else: `yyyy-MM-ddTHH:mm:ss`, optionally followed by a literal
//!   `Z`. The `Z` is not a timezone marker here and is dropped before parsing.

use crate::error::{AerodromeError, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::warn;

/// Format of `expires_on` in the authentication response
pub const TOKEN_EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format of dates in API payloads (after stripping a trailing `Z`)
pub const API_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a token expiry timestamp
///
/// # Errors
/// Returns `InvalidArgument` if the value does not match [`TOKEN_EXPIRY_FORMAT`].
pub fn parse_token_expiry(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TOKEN_EXPIRY_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            AerodromeError::invalid_argument(format!("Failed to convert {} to Date: {}", value, e))
        })
}

/// A date taken from an API payload.
///
/// Keeps the exact string the API sent alongside the parsed value, so a
/// record can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDate {
    raw: String,
    value: NaiveDateTime,
}

impl ApiDate {
    /// Parse an API date, dropping one trailing `Z`
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.strip_suffix('Z').unwrap_or(value);
        let parsed = NaiveDateTime::parse_from_str(trimmed, API_DATE_FORMAT).map_err(|e| {
            AerodromeError::invalid_argument(format!(
                "Failed to parse date {} with format {}: {}",
                value, API_DATE_FORMAT, e
            ))
        })?;

        Ok(Self {
            raw: value.to_string(),
            value: parsed,
        })
    }

    /// Lenient variant of [`ApiDate::parse`] for optional payload fields.
    ///
    /// Empty input yields `None` silently; unparseable input yields `None`
    /// and a warning.
    pub fn from_api_value(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }

        match Self::parse(value) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(value, error = %e, "Failed to parse API date");
                None
            }
        }
    }

    /// Current UTC time, formatted the way the API expects
    pub fn now() -> Self {
        Self::from_naive(Utc::now().naive_utc())
    }

    /// Build from a parsed value; sub-second precision is dropped
    pub fn from_naive(value: NaiveDateTime) -> Self {
        let value = value.with_nanosecond(0).unwrap_or(value);
        Self {
            raw: value.format(API_DATE_FORMAT).to_string(),
            value,
        }
    }

    /// The exact string received from the API
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.value
    }
}

impl fmt::Display for ApiDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ApiDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ApiDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ApiDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

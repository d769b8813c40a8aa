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


//! Aerodrome: client for the Jet.com merchant API
//!
//! Authenticates a merchant account and carries API calls over a pooled,
//! reaped HTTP transport. Endpoint-specific record types live with callers;
//! this crate moves bytes, tracks the token and classifies failures.

pub mod api;
pub mod error;

pub use api::{ApiClient, Authenticator, ClientConfig, LoginOutcome};
pub use error::{AerodromeError, ErrorKind, Result};

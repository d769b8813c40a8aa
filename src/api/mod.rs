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


//! Jet.com merchant API client
//!
//! Layers, bottom up:
//! - [`credentials`] - token state shared by everything above it
//! - [`pool`] and [`reaper`] - pooled connections and their background cleanup
//! - [`transport`] - one request in, one response out
//! - [`client`] - header assembly and status classification
//! - [`auth`] - login and the liveness probe

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod date;
pub mod pool;
pub mod reaper;
pub mod transport;

// Re-export commonly used types
pub use auth::{AuthState, Authenticator, LoginOutcome};
pub use client::ApiClient;
pub use config::{ClientConfig, Endpoints};
pub use credentials::{CredentialState, TokenSnapshot};
pub use date::ApiDate;
pub use reaper::{ConnectionReaper, ReaperConfig};
pub use transport::{ApiResponse, Headers, HttpMethod, HttpTransport, RequestDescriptor, ReqwestTransport};

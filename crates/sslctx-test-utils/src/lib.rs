// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! # sslctx Test Utilities
//!
//! Shared test utilities for sslctx crates providing:
//! - A throwaway CA that issues leaf certificates with exact validity windows
//! - An in-memory rustls handshake driver

pub mod handshake;
pub mod pki;

// Re-export commonly used items at crate root
pub use handshake::{handshake, HandshakeOutcome};
pub use pki::{unix_now, IssuedCert, TestPki, DAY};

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
//! TLS context management for a proxy
//!
//! Holds the live set of TLS client and server contexts, swaps them on
//! certificate rotation without disturbing connections that still use the
//! old material, and reports how soon the first managed certificate
//! expires.
//!
//! - [`ContextManager`]: create, update, iterate and release contexts
//! - [`ContextSlot`]: a listener's lock-free view of its current context
//! - [`SecretRotation`]: rotate a slot whenever a secret is redelivered
//! - [`SecretManager`]: dynamically delivered certificate material
//! - [`StatsScope`]: Prometheus counters attributed to each context

// Configuration inputs
pub mod config;
pub mod secret;
pub mod settings;

// Contexts and their construction
pub mod chain;
pub mod context;
pub mod engine;

// Lifecycle
pub mod expiry;
pub mod manager;
mod registry;
pub mod rotation;
pub mod slot;

pub mod error;
pub mod stats;

// Re-export commonly used types
pub use config::{
    CertificateSource, ClientContextConfig, ClientContextConfigBuilder, CommonTlsConfig,
    MaterialSource, ServerContextConfig, ServerContextConfigBuilder, TlsCertificate,
    TlsVersion, ValidationContext,
};
pub use chain::{CertificateChain, CertificateDetails};
pub use context::{
    ClientContext, Context, ContextId, ContextKind, ContextRole, ServerContext, SharedContext,
};
pub use engine::{RustlsEngine, TlsEngine};
pub use error::{ContextError, ContextResult};
pub use expiry::{ExpiryStatus, ManualTimeSource, SystemTimeSource, TimeSource};
pub use manager::{ContextManager, ContextManagerBuilder};
pub use rotation::SecretRotation;
pub use secret::{SecretManager, StaticSecretManager};
pub use settings::ManagerSettings;
pub use slot::ContextSlot;
pub use stats::{ContextStats, StatsScope};

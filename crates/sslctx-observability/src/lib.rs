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
//! Structured logging for sslctx
//!
//! Installs a `tracing` subscriber for processes embedding the context
//! manager, in pretty, compact or JSON format.
//!
//! ```no_run
//! use sslctx_observability::{init_tracing_with_config, LogConfig, LogFormat};
//!
//! let config = LogConfig::new()
//!     .with_format(LogFormat::Json)
//!     .with_level("info")
//!     .with_context_level("debug");
//! init_tracing_with_config(&config).unwrap();
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput, LOG_ENV_VAR};
pub use initialization::{init_tracing, init_tracing_with_config};

/// Tracing re-exports for convenience
pub use tracing::{debug, error, info, trace, warn, Level};

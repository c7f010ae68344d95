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
//! Configuration for structured logging.
//!
//! Besides the global level, [`LogConfig::context_level`] controls the
//! `sslctx_manager` target separately, so context lifecycle events (create,
//! rotate, release) can be traced without turning up everything else.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable consulted when no level is configured
pub const LOG_ENV_VAR: &str = "SSLCTX_LOG";

/// Errors that can occur during logging configuration
#[derive(Error, Debug)]
pub enum LogError {
    /// Unknown output format name
    #[error("Unknown log format: {0}. Expected one of: pretty, compact, json")]
    InvalidFormat(String),

    /// Filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// The rejected directive
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Output format for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,

    /// Compact single-line format
    Compact,

    /// JSON lines for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard error
    #[default]
    Stderr,

    /// Standard output
    Stdout,
}

/// Configuration for logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,

    /// Global filter (e.g. "info", "warn,rustls=error")
    ///
    /// Falls back to `SSLCTX_LOG`, then `RUST_LOG`, then "info".
    pub level: Option<String>,

    /// Level for the `sslctx_manager` target, overriding the global filter
    pub context_level: Option<String>,

    /// ANSI colors (ignored for JSON)
    pub use_color: bool,

    /// Include timestamps
    pub use_timestamps: bool,

    /// Include thread IDs
    pub include_thread_ids: bool,

    /// Include target module names
    pub include_targets: bool,

    /// Output destination
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Pretty,
            level: None,
            context_level: None,
            use_color: true,
            use_timestamps: true,
            include_thread_ids: false,
            include_targets: true,
            output: LogOutput::Stderr,
        }
    }
}

impl LogConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the global filter
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Set the level for context lifecycle events
    pub fn with_context_level(mut self, level: impl Into<String>) -> Self {
        self.context_level = Some(level.into());
        self
    }

    /// Enable or disable color output
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, use_timestamps: bool) -> Self {
        self.use_timestamps = use_timestamps;
        self
    }

    /// Enable or disable thread IDs
    pub fn with_thread_ids(mut self, include_thread_ids: bool) -> Self {
        self.include_thread_ids = include_thread_ids;
        self
    }

    /// Enable or disable target module names
    pub fn with_targets(mut self, include_targets: bool) -> Self {
        self.include_targets = include_targets;
        self
    }

    /// Set the output destination
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Global filter from config or environment
    pub fn effective_level(&self) -> String {
        self.level
            .clone()
            .or_else(|| std::env::var(LOG_ENV_VAR).ok())
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string())
    }

    /// Full filter directive string, including the context override
    pub fn filter_directives(&self) -> String {
        match &self.context_level {
            Some(level) => format!("{},sslctx_manager={}", self.effective_level(), level),
            None => self.effective_level(),
        }
    }
}

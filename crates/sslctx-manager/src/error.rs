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
//! Error types for context management.

use thiserror::Error;

use crate::context::{ContextId, ContextRole};

/// Errors surfaced by the context manager and its collaborators
#[derive(Debug, Error)]
pub enum ContextError {
    /// Certificate, key or trust material could not be parsed or used
    #[error("Invalid TLS context configuration: {0}")]
    InvalidConfiguration(String),

    /// The context is not (or no longer) owned by this manager
    #[error("Context {id} is not managed by this context manager")]
    UnknownContext {
        /// Identity of the offending context
        id: ContextId,
    },

    /// The context was released more times than it was acquired
    #[error("Context {id} released more times than it was acquired")]
    DoubleRelease {
        /// Identity of the offending context
        id: ContextId,
    },

    /// A client context was passed where a server context was expected, or vice versa
    #[error("Expected a {expected} context, got a {actual} context")]
    RoleMismatch {
        /// Role required by the operation
        expected: ContextRole,
        /// Role of the context that was supplied
        actual: ContextRole,
    },

    /// A configuration referenced a secret the secret manager does not hold
    #[error("TLS certificate secret not found: {0}")]
    SecretNotFound(String),

    /// Manager settings failed validation
    #[error("Invalid manager settings: {0}")]
    Settings(String),

    /// Manager settings could not be parsed
    #[error("Failed to parse manager settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// I/O error while reading certificate material or settings
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stat counters could not be registered under the supplied scope
    #[error("Stats registration failed: {0}")]
    Stats(#[from] prometheus::Error),
}

impl ContextError {
    /// Build an [`ContextError::InvalidConfiguration`] from any message
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ContextError::InvalidConfiguration(message.into())
    }

    /// Whether the error indicates a lifecycle bug in the caller rather than bad input
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(
            self,
            ContextError::UnknownContext { .. }
                | ContextError::DoubleRelease { .. }
                | ContextError::RoleMismatch { .. }
        )
    }
}

/// Result alias for context management operations
pub type ContextResult<T> = Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_violation_classification() {
        let id = ContextId::from_hex("ab".repeat(32));
        assert!(ContextError::DoubleRelease { id: id.clone() }.is_lifecycle_violation());
        assert!(ContextError::UnknownContext { id }.is_lifecycle_violation());
        assert!(!ContextError::invalid_configuration("bad key").is_lifecycle_violation());
    }

    #[test]
    fn test_role_mismatch_message() {
        let err = ContextError::RoleMismatch {
            expected: ContextRole::Server,
            actual: ContextRole::Client,
        };
        assert_eq!(err.to_string(), "Expected a server context, got a client context");
    }
}

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
//! Manager settings
//!
//! Loaded from TOML, optionally overridden from `SSLCTX_*` environment
//! variables.
//!
//! ```toml
//! rotation_warning_days = 21
//! deduplicate = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};

/// Longest accepted rotation warning window
pub const MAX_ROTATION_WARNING_DAYS: u64 = 3650;

/// Tunables for a [`ContextManager`](crate::ContextManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Certificates expiring within this many days report `RotationDue`
    pub rotation_warning_days: u64,

    /// Serve identical create requests from the existing live context
    pub deduplicate: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            rotation_warning_days: 30,
            deduplicate: true,
        }
    }
}

impl ManagerSettings {
    /// Parse and validate settings from TOML text
    pub fn from_toml_str(content: &str) -> ContextResult<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ContextResult<Self> {
        let path = path.as_ref();
        debug!("Loading manager settings from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;

        info!(
            rotation_warning_days = settings.rotation_warning_days,
            deduplicate = settings.deduplicate,
            "Loaded manager settings from {}",
            path.display()
        );
        Ok(settings)
    }

    /// Apply `SSLCTX_ROTATION_WARNING_DAYS` and `SSLCTX_DEDUPLICATE`
    pub fn apply_env_overrides(&mut self) -> ContextResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ContextResult<()> {
        if let Some(value) = lookup("SSLCTX_ROTATION_WARNING_DAYS") {
            self.rotation_warning_days = value.trim().parse().map_err(|_| {
                ContextError::Settings(format!(
                    "SSLCTX_ROTATION_WARNING_DAYS must be a number of days, got {:?}",
                    value
                ))
            })?;
            debug!(value = self.rotation_warning_days, "Applied SSLCTX_ROTATION_WARNING_DAYS");
        }

        if let Some(value) = lookup("SSLCTX_DEDUPLICATE") {
            self.deduplicate = parse_bool(&value)?;
            debug!(value = self.deduplicate, "Applied SSLCTX_DEDUPLICATE");
        }

        self.validate()
    }

    /// Validate settings
    pub fn validate(&self) -> ContextResult<()> {
        if self.rotation_warning_days > MAX_ROTATION_WARNING_DAYS {
            return Err(ContextError::Settings(format!(
                "rotation_warning_days must be at most {}, got {}",
                MAX_ROTATION_WARNING_DAYS, self.rotation_warning_days
            )));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> ContextResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ContextError::Settings(format!(
            "SSLCTX_DEDUPLICATE must be a boolean, got {:?}",
            value
        ))),
    }
}

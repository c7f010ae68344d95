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
//! Secret-driven rotation
//!
//! Watches one secret and rotates a listener's [`ContextSlot`] whenever new
//! material is delivered. A failed rotation is logged and the current
//! context stays in force; the next delivery is tried again.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{CertificateSource, ServerContextConfig};
use crate::context::ContextId;
use crate::error::ContextResult;
use crate::manager::ContextManager;
use crate::slot::ContextSlot;
use crate::stats::StatsScope;

/// Rotates a server slot from a named secret
#[derive(Debug)]
pub struct SecretRotation {
    manager: Arc<ContextManager>,
    slot: Arc<ContextSlot>,
    secret_name: String,
    template: ServerContextConfig,
    server_names: Vec<String>,
    scope: StatsScope,
}

impl SecretRotation {
    /// Rotate `slot` using `template` with its certificates replaced by the
    /// secret's material
    pub fn new(
        manager: Arc<ContextManager>,
        slot: Arc<ContextSlot>,
        secret_name: impl Into<String>,
        template: ServerContextConfig,
    ) -> Self {
        Self {
            manager,
            slot,
            secret_name: secret_name.into(),
            template,
            server_names: Vec::new(),
            scope: StatsScope::isolated(),
        }
    }

    /// Server names for the rotated contexts
    pub fn with_server_names(mut self, server_names: Vec<String>) -> Self {
        self.server_names = server_names;
        self
    }

    /// Stats scope for the rotated contexts
    pub fn with_scope(mut self, scope: StatsScope) -> Self {
        self.scope = scope;
        self
    }

    /// Resolve the secret and rotate once, releasing the previous context
    pub fn rotate_once(&self) -> ContextResult<ContextId> {
        let source = CertificateSource::Secret {
            name: self.secret_name.clone(),
        };
        let certificate = source.resolve(self.manager.secret_manager().as_ref())?;

        let mut config = self.template.clone();
        config.common.tls_certificates = vec![certificate];

        let previous =
            self.slot
                .rotate_server(&self.manager, &self.scope, &config, &self.server_names)?;
        self.manager.release_context(&previous)?;
        Ok(self.slot.current().id().clone())
    }

    /// Run until the secret is removed
    pub fn spawn(self) -> JoinHandle<()> {
        let mut updates = self.manager.secret_manager().subscribe(&self.secret_name);

        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let version = *updates.borrow_and_update();
                match self.rotate_once() {
                    Ok(id) => info!(
                        secret = %self.secret_name,
                        version,
                        context = %id.short(),
                        "Rotated TLS context from secret"
                    ),
                    Err(e) => warn!(
                        secret = %self.secret_name,
                        version,
                        error = %e,
                        "TLS context rotation failed; keeping current context"
                    ),
                }
            }
            info!(secret = %self.secret_name, "TLS certificate secret removed; rotation stopped");
        })
    }
}

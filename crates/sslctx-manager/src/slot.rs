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
//! Listener-side active context holder
//!
//! The accept path calls [`ContextSlot::current`], a lock-free pointer load,
//! and keeps the returned handle for the life of the connection. Rotation
//! swaps the pointer; connections that already loaded the old handle keep
//! using it.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::config::{ClientContextConfig, ServerContextConfig};
use crate::context::{Context, SharedContext};
use crate::error::ContextResult;
use crate::manager::ContextManager;
use crate::stats::StatsScope;

/// The context a listener currently serves
pub struct ContextSlot {
    current: ArcSwap<Context>,
    rotate: Mutex<()>,
}

impl fmt::Debug for ContextSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSlot")
            .field("current", &self.current.load().id().short())
            .finish()
    }
}

impl ContextSlot {
    /// Install an initial context; the slot takes over the caller's hold
    pub fn new(context: SharedContext) -> Self {
        Self {
            current: ArcSwap::new(context),
            rotate: Mutex::new(()),
        }
    }

    /// Context to use for a new connection
    pub fn current(&self) -> SharedContext {
        self.current.load_full()
    }

    /// Rotate to a client context built from `config`
    ///
    /// Returns the previous context. The slot's hold on it passes to the
    /// caller, who releases it once convenient.
    pub fn rotate_client(
        &self,
        manager: &ContextManager,
        scope: &StatsScope,
        config: &ClientContextConfig,
    ) -> ContextResult<SharedContext> {
        let _rotating = self.rotate.lock().unwrap_or_else(PoisonError::into_inner);
        let old = self.current.load_full();
        let new = manager.update_client_context(&old, scope, config)?;
        Ok(self.install(new))
    }

    /// Rotate to a server context built from `config`
    ///
    /// Returns the previous context. The slot's hold on it passes to the
    /// caller, who releases it once convenient.
    pub fn rotate_server(
        &self,
        manager: &ContextManager,
        scope: &StatsScope,
        config: &ServerContextConfig,
        server_names: &[String],
    ) -> ContextResult<SharedContext> {
        let _rotating = self.rotate.lock().unwrap_or_else(PoisonError::into_inner);
        let old = self.current.load_full();
        let new = manager.update_server_context(&old, scope, config, server_names)?;
        Ok(self.install(new))
    }

    /// Release the slot's hold on listener teardown
    pub fn release(self, manager: &ContextManager) -> ContextResult<()> {
        manager.release_context(&self.current.load_full())
    }

    fn install(&self, new: SharedContext) -> SharedContext {
        let previous = self.current.swap(new);
        debug!(
            previous = %previous.id().short(),
            current = %self.current.load().id().short(),
            "Swapped active TLS context"
        );
        previous
    }
}

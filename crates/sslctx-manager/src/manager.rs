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
//! The context manager
//!
//! [`ContextManager`] is the single authority for creating, rotating,
//! enumerating and releasing TLS contexts. Construct one at startup and
//! share it by `Arc` with every listener and config loader.
//!
//! # Locking
//!
//! One mutex guards the registry. It is taken for bookkeeping only, never
//! while certificates are parsed or the engine builds handshake parameters.
//! Because two identical creates can race past the first lookup, the
//! fingerprint is checked again under the lock before inserting, and the
//! loser joins the winner's entry.
//!
//! The soonest live expiration is mirrored into an atomic after every
//! mutation, so expiration queries never touch the lock.
//!
//! # Examples
//!
//! ```no_run
//! use sslctx_manager::{ContextManager, ServerContextConfig, StaticSecretManager, StatsScope, TlsCertificate};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), sslctx_manager::ContextError> {
//! let manager = ContextManager::new(Arc::new(StaticSecretManager::new()));
//! let config = ServerContextConfig::builder()
//!     .certificate(TlsCertificate::from_files("cert.pem", "key.pem")?)
//!     .alpn("h2")
//!     .build()?;
//!
//! let scope = StatsScope::isolated().scope("listener_443");
//! let context = manager.create_server_context(&scope, &config, &["example.com".to_string()])?;
//! println!("days left: {:?}", manager.days_until_first_cert_expires());
//! manager.release_context(&context)?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::chain::ParsedMaterial;
use crate::config::{ClientContextConfig, ServerContextConfig};
use crate::context::{
    Context, ContextId, ContextKind, ContextParts, ContextRole, ManagerId, SharedContext, SlotId,
};
use crate::engine::{RustlsEngine, TlsEngine};
use crate::error::{ContextError, ContextResult};
use crate::expiry::{days_between, ExpiryStatus, SystemTimeSource, TimeSource};
use crate::registry::{Registry, ReleaseOutcome};
use crate::secret::SecretManager;
use crate::settings::ManagerSettings;
use crate::stats::{ContextStats, ManagerStats, StatsScope};

const NO_EXPIRY: i64 = i64::MAX;

/// Creates, rotates, enumerates and releases TLS contexts
pub struct ContextManager {
    id: ManagerId,
    registry: Mutex<Registry>,
    min_expiry: AtomicI64,
    next_slot: AtomicU64,
    secret_manager: Arc<dyn SecretManager>,
    engine: Arc<dyn TlsEngine>,
    time_source: Arc<dyn TimeSource>,
    settings: ManagerSettings,
    stats: Option<ManagerStats>,
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.lock_registry();
        f.debug_struct("ContextManager")
            .field("id", &self.id)
            .field("live", &registry.live_count())
            .field("retired", &registry.retired_count())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ContextManager {
    /// Manager with the rustls engine, the system clock and default settings
    pub fn new(secret_manager: Arc<dyn SecretManager>) -> Self {
        Self::from_parts(
            secret_manager,
            Arc::new(RustlsEngine::new()),
            Arc::new(SystemTimeSource),
            ManagerSettings::default(),
            None,
        )
    }

    /// Start configuring a manager
    pub fn builder() -> ContextManagerBuilder {
        ContextManagerBuilder::default()
    }

    fn from_parts(
        secret_manager: Arc<dyn SecretManager>,
        engine: Arc<dyn TlsEngine>,
        time_source: Arc<dyn TimeSource>,
        settings: ManagerSettings,
        stats: Option<ManagerStats>,
    ) -> Self {
        Self {
            id: ManagerId::next(),
            registry: Mutex::new(Registry::default()),
            min_expiry: AtomicI64::new(NO_EXPIRY),
            next_slot: AtomicU64::new(1),
            secret_manager,
            engine,
            time_source,
            settings,
            stats,
        }
    }

    /// Build a client context, or join the live one with the same configuration
    pub fn create_client_context(
        &self,
        scope: &StatsScope,
        config: &ClientContextConfig,
    ) -> ContextResult<SharedContext> {
        config.validate()?;
        let id = ContextId::for_client(config);
        self.acquire(id, None, |id| self.build_client(id, scope, config))
    }

    /// Build a server context for `server_names`, or join the live one with
    /// the same configuration
    ///
    /// An empty `server_names` builds a catch-all context.
    pub fn create_server_context(
        &self,
        scope: &StatsScope,
        config: &ServerContextConfig,
        server_names: &[String],
    ) -> ContextResult<SharedContext> {
        config.validate_for(server_names)?;
        let id = ContextId::for_server(config, server_names);
        self.acquire(id, None, |id| self.build_server(id, scope, config, server_names))
    }

    /// Replace `old` with a client context built from `config`
    ///
    /// `old` is retired once no other holder still serves it, and stays
    /// usable for its holders, who still have to release it. On error `old`
    /// is left untouched.
    pub fn update_client_context(
        &self,
        old: &SharedContext,
        scope: &StatsScope,
        config: &ClientContextConfig,
    ) -> ContextResult<SharedContext> {
        self.check_replaceable(old, ContextRole::Client)?;
        config.validate()?;
        let id = ContextId::for_client(config);
        self.acquire(id, Some(old), |id| self.build_client(id, scope, config))
    }

    /// Replace `old` with a server context built from `config`
    ///
    /// `old` is retired once no other holder still serves it, and stays
    /// usable for its holders, who still have to release it. On error `old`
    /// is left untouched.
    pub fn update_server_context(
        &self,
        old: &SharedContext,
        scope: &StatsScope,
        config: &ServerContextConfig,
        server_names: &[String],
    ) -> ContextResult<SharedContext> {
        self.check_replaceable(old, ContextRole::Server)?;
        config.validate_for(server_names)?;
        let id = ContextId::for_server(config, server_names);
        self.acquire(id, Some(old), |id| {
            self.build_server(id, scope, config, server_names)
        })
    }

    /// Whole days until the soonest live certificate expires
    ///
    /// `None` means no live context holds a certificate. `Some(0)` means a
    /// certificate expires within a day or has already expired.
    pub fn days_until_first_cert_expires(&self) -> Option<u64> {
        self.first_expiry()
            .map(|expires_at| days_between(self.time_source.now(), expires_at))
    }

    /// Soonest `not_after` across live contexts
    pub fn first_expiry(&self) -> Option<DateTime<Utc>> {
        match self.min_expiry.load(Ordering::Acquire) {
            NO_EXPIRY => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    /// Soonest expiry classified against the rotation warning window
    pub fn expiry_status(&self) -> ExpiryStatus {
        ExpiryStatus::classify(
            self.time_source.now(),
            self.first_expiry(),
            self.settings.rotation_warning_days,
        )
    }

    /// Call `callback` once per live context
    ///
    /// Handles are snapshotted first and the lock is released before the
    /// callback runs, so the callback may create, update or release
    /// contexts. Contexts created during iteration are not visited.
    pub fn iterate_contexts<F>(&self, mut callback: F)
    where
        F: FnMut(&Context),
    {
        let snapshot = self.contexts();
        debug!(count = snapshot.len(), "Iterating live TLS contexts");
        for context in &snapshot {
            callback(context);
        }
    }

    /// Snapshot of live contexts, oldest first
    pub fn contexts(&self) -> Vec<SharedContext> {
        self.lock_registry().snapshot_live()
    }

    /// Give up one hold on `context`
    ///
    /// The entry is destroyed when its last holder releases. Releasing more
    /// often than the context was handed out is rejected.
    ///
    /// Handles to a shared entry are indistinguishable, so over-release is
    /// detected per entry, not per handle: a holder that releases twice
    /// consumes another holder's hold, and the error surfaces on that
    /// holder's release.
    pub fn release_context(&self, context: &SharedContext) -> ContextResult<()> {
        self.check_owner(context)?;

        let mut registry = self.lock_registry();
        let Some(outcome) = registry.release(context.slot()) else {
            drop(registry);
            error!(
                context = %context.id().short(),
                slot = %context.slot(),
                "TLS context released more times than it was acquired"
            );
            return Err(ContextError::DoubleRelease {
                id: context.id().clone(),
            });
        };
        if matches!(outcome, ReleaseOutcome::Erased { was_live: true, .. }) {
            self.publish_expiry(&registry);
        }
        self.publish_gauges(&registry);
        drop(registry);

        if let Some(stats) = &self.stats {
            stats.released.inc();
        }

        match outcome {
            ReleaseOutcome::Held { remaining } => {
                debug!(
                    context = %context.id().short(),
                    slot = %context.slot(),
                    remaining,
                    "Released TLS context hold"
                );
            }
            ReleaseOutcome::Erased { context: erased, was_live } => {
                info!(
                    context = %erased.id().short(),
                    slot = %erased.slot(),
                    role = %erased.role(),
                    was_live,
                    "TLS context destroyed"
                );
            }
        }
        Ok(())
    }

    /// The secret manager configurations are resolved against
    pub fn secret_manager(&self) -> &Arc<dyn SecretManager> {
        &self.secret_manager
    }

    /// Active settings
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Number of live contexts
    pub fn live_count(&self) -> usize {
        self.lock_registry().live_count()
    }

    /// Number of retired contexts still waiting for their holders
    pub fn retired_count(&self) -> usize {
        self.lock_registry().retired_count()
    }

    /// Outstanding holds on `context`; `None` once it has been destroyed or
    /// if it belongs to another manager
    pub fn holder_count(&self, context: &SharedContext) -> Option<usize> {
        if context.owner() != self.id {
            return None;
        }
        self.lock_registry().holders(context.slot())
    }

    /// Whether `context` is still discoverable through iteration
    pub fn is_live(&self, context: &SharedContext) -> bool {
        context.owner() == self.id && self.lock_registry().is_live(context.slot())
    }

    fn acquire<F>(
        &self,
        id: ContextId,
        replacing: Option<&SharedContext>,
        build: F,
    ) -> ContextResult<SharedContext>
    where
        F: FnOnce(ContextId) -> ContextResult<ContextParts>,
    {
        {
            let mut registry = self.lock_registry();
            self.check_present(&registry, replacing)?;
            if let Some(existing) = self.join_existing(&mut registry, &id, replacing) {
                self.commit(&mut registry, &existing, replacing);
                drop(registry);
                self.record_join(&existing, replacing);
                return Ok(existing);
            }
        }

        let parts = build(id)?;
        let fresh = Arc::new(Context::assemble(parts, self.id, self.next_slot()));

        let mut registry = self.lock_registry();
        self.check_present(&registry, replacing)?;
        let context = match self.join_existing(&mut registry, fresh.id(), replacing) {
            Some(existing) => existing,
            None => {
                registry.insert(Arc::clone(&fresh));
                Arc::clone(&fresh)
            }
        };
        self.commit(&mut registry, &context, replacing);
        drop(registry);

        if Arc::ptr_eq(&context, &fresh) {
            self.record_created(&context, replacing);
        } else {
            self.record_join(&context, replacing);
        }
        Ok(context)
    }

    /// Live entry a request should share instead of building a new one
    ///
    /// An update whose material matches the context it replaces always
    /// keeps that context. Otherwise live entries are shared only when
    /// deduplication is enabled.
    fn join_existing(
        &self,
        registry: &mut Registry,
        id: &ContextId,
        replacing: Option<&SharedContext>,
    ) -> Option<SharedContext> {
        if let Some(old) = replacing {
            if old.id() == id && registry.is_live(old.slot()) {
                return registry.join_slot(old.slot());
            }
        }
        if self.settings.deduplicate {
            registry.join_live(id)
        } else {
            None
        }
    }

    fn commit(
        &self,
        registry: &mut Registry,
        context: &SharedContext,
        replacing: Option<&SharedContext>,
    ) {
        if let Some(old) = replacing {
            if !Arc::ptr_eq(context, old) && !registry.supersede(old.slot()) {
                debug!(
                    context = %old.id().short(),
                    slot = %old.slot(),
                    "Replaced TLS context is still in service for other holders"
                );
            }
        }
        self.publish_expiry(registry);
        self.publish_gauges(registry);
    }

    fn build_client(
        &self,
        id: ContextId,
        scope: &StatsScope,
        config: &ClientContextConfig,
    ) -> ContextResult<ContextParts> {
        let material = ParsedMaterial::from_config(&config.common)?;
        let tls = self.engine.build_client(config, &material)?;
        let kind = ContextKind::client(config.server_name_indication.clone(), tls);
        self.parts(id, scope, kind, material)
    }

    fn build_server(
        &self,
        id: ContextId,
        scope: &StatsScope,
        config: &ServerContextConfig,
        server_names: &[String],
    ) -> ContextResult<ContextParts> {
        let material = ParsedMaterial::from_config(&config.common)?;
        let tls = self.engine.build_server(config, server_names, &material)?;
        let kind = ContextKind::server(server_names.to_vec(), tls);
        self.parts(id, scope, kind, material)
    }

    fn parts(
        &self,
        id: ContextId,
        scope: &StatsScope,
        kind: ContextKind,
        material: ParsedMaterial,
    ) -> ContextResult<ContextParts> {
        let expires_at = material.expires_at();
        let (cert_chains, ca_chain) = material.into_info();
        Ok(ContextParts {
            id,
            kind,
            cert_chains,
            ca_chain,
            expires_at,
            created_at: self.time_source.now(),
            stats: ContextStats::register(scope)?,
        })
    }

    fn check_owner(&self, context: &SharedContext) -> ContextResult<()> {
        if context.owner() == self.id {
            return Ok(());
        }
        error!(
            context = %context.id().short(),
            "TLS context belongs to a different context manager"
        );
        Err(ContextError::UnknownContext {
            id: context.id().clone(),
        })
    }

    fn check_replaceable(&self, old: &SharedContext, expected: ContextRole) -> ContextResult<()> {
        self.check_owner(old)?;
        if old.role() != expected {
            return Err(ContextError::RoleMismatch {
                expected,
                actual: old.role(),
            });
        }
        self.check_present(&self.lock_registry(), Some(old))
    }

    fn check_present(&self, registry: &Registry, old: Option<&SharedContext>) -> ContextResult<()> {
        match old {
            Some(old) if !registry.contains(old.slot()) => {
                error!(
                    context = %old.id().short(),
                    slot = %old.slot(),
                    "Cannot update a TLS context that has already been destroyed"
                );
                Err(ContextError::UnknownContext {
                    id: old.id().clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn record_created(&self, context: &SharedContext, replacing: Option<&SharedContext>) {
        if let Some(stats) = &self.stats {
            stats.created.inc();
            if replacing.is_some() {
                stats.rotated.inc();
            }
        }

        match replacing {
            Some(old) => info!(
                context = %context.id().short(),
                slot = %context.slot(),
                retired = %old.id().short(),
                retired_slot = %old.slot(),
                role = %context.role(),
                server_names = ?context.server_names(),
                expires_at = ?context.expires_at(),
                "Rotated TLS context"
            ),
            None => info!(
                context = %context.id().short(),
                slot = %context.slot(),
                role = %context.role(),
                server_names = ?context.server_names(),
                expires_at = ?context.expires_at(),
                "Created TLS context"
            ),
        }

        if let Some(expires_at) = context.expires_at() {
            if expires_at <= self.time_source.now() {
                warn!(
                    context = %context.id().short(),
                    expires_at = %expires_at,
                    "TLS context holds an already expired certificate"
                );
            }
        }
    }

    fn record_join(&self, context: &SharedContext, replacing: Option<&SharedContext>) {
        let unchanged = replacing.is_some_and(|old| Arc::ptr_eq(context, old));
        if let Some(stats) = &self.stats {
            stats.deduplicated.inc();
            if replacing.is_some() && !unchanged {
                stats.rotated.inc();
            }
        }

        if unchanged {
            info!(
                context = %context.id().short(),
                slot = %context.slot(),
                "TLS context update carried unchanged material; keeping current context"
            );
        } else {
            debug!(
                context = %context.id().short(),
                slot = %context.slot(),
                "Joined existing live TLS context"
            );
        }
    }

    fn publish_expiry(&self, registry: &Registry) {
        self.min_expiry
            .store(registry.min_expiry().unwrap_or(NO_EXPIRY), Ordering::Release);
    }

    fn publish_gauges(&self, registry: &Registry) {
        if let Some(stats) = &self.stats {
            stats.live.set(registry.live_count() as i64);
            stats.retired.set(registry.retired_count() as i64);
        }
    }

    fn next_slot(&self) -> SlotId {
        SlotId(self.next_slot.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`ContextManager`]
#[derive(Default)]
pub struct ContextManagerBuilder {
    secret_manager: Option<Arc<dyn SecretManager>>,
    engine: Option<Arc<dyn TlsEngine>>,
    time_source: Option<Arc<dyn TimeSource>>,
    settings: ManagerSettings,
    stats_scope: Option<StatsScope>,
}

impl ContextManagerBuilder {
    /// Secret manager to expose to configuration resolution
    pub fn secret_manager(mut self, secret_manager: Arc<dyn SecretManager>) -> Self {
        self.secret_manager = Some(secret_manager);
        self
    }

    /// TLS engine; defaults to [`RustlsEngine`]
    pub fn engine(mut self, engine: Arc<dyn TlsEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Clock used for expiration queries; defaults to the system clock
    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Manager settings
    pub fn settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register manager-wide counters under `scope`
    pub fn stats_scope(mut self, scope: StatsScope) -> Self {
        self.stats_scope = Some(scope);
        self
    }

    /// Build the manager
    pub fn build(self) -> ContextResult<ContextManager> {
        self.settings.validate()?;
        let stats = self
            .stats_scope
            .map(|scope| ManagerStats::register(&scope.scope("context_manager")))
            .transpose()?;

        Ok(ContextManager::from_parts(
            self.secret_manager
                .unwrap_or_else(|| Arc::new(crate::secret::StaticSecretManager::new())),
            self.engine.unwrap_or_else(|| Arc::new(RustlsEngine::new())),
            self.time_source.unwrap_or_else(|| Arc::new(SystemTimeSource)),
            self.settings,
            stats,
        ))
    }
}

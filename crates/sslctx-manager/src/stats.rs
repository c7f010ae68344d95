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
//! Stats scopes and the counters attached to contexts
//!
//! A [`StatsScope`] is a name prefix over a shared Prometheus registry.
//! Asking a scope for the same counter twice returns the same counter, so
//! a context and its rotated replacement report into one series.
//!
//! The name cache lives in the root scope, so create one root per
//! registry and hand out clones or child scopes of it. A second root over
//! the same registry cannot see the first root's metrics, and registering
//! a name the first root already owns fails with [`ContextError::Stats`].
//!
//! [`ContextError::Stats`]: crate::ContextError::Stats

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ContextResult;

struct ScopeShared {
    registry: Registry,
    counters: Mutex<HashMap<String, IntCounter>>,
    gauges: Mutex<HashMap<String, IntGauge>>,
}

/// Prefix-scoped view over a Prometheus registry
///
/// Cloning is cheap; clones and child scopes share the registry.
#[derive(Clone)]
pub struct StatsScope {
    shared: Arc<ScopeShared>,
    prefix: String,
}

impl fmt::Debug for StatsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsScope")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl StatsScope {
    /// Root scope over an existing registry
    ///
    /// Use one root per registry; derive every other scope from it.
    pub fn new(registry: Registry) -> Self {
        Self {
            shared: Arc::new(ScopeShared {
                registry,
                counters: Mutex::new(HashMap::new()),
                gauges: Mutex::new(HashMap::new()),
            }),
            prefix: String::new(),
        }
    }

    /// Root scope over a fresh, private registry
    pub fn isolated() -> Self {
        Self::new(Registry::new())
    }

    /// Child scope; `name` is appended to the prefix
    pub fn scope(&self, name: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            prefix: format!("{}{}_", self.prefix, sanitize(name)),
        }
    }

    /// Current metric name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Underlying registry, for gathering
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Get or register a counter under this scope
    pub fn counter(&self, name: &str, help: &str) -> ContextResult<IntCounter> {
        let full_name = self.full_name(name);
        let mut counters = self
            .shared
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(counter) = counters.get(&full_name) {
            return Ok(counter.clone());
        }

        let counter = IntCounter::with_opts(Opts::new(full_name.clone(), help))?;
        self.shared.registry.register(Box::new(counter.clone()))?;
        counters.insert(full_name, counter.clone());
        Ok(counter)
    }

    /// Get or register a gauge under this scope
    pub fn gauge(&self, name: &str, help: &str) -> ContextResult<IntGauge> {
        let full_name = self.full_name(name);
        let mut gauges = self
            .shared
            .gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(gauge) = gauges.get(&full_name) {
            return Ok(gauge.clone());
        }

        let gauge = IntGauge::with_opts(Opts::new(full_name.clone(), help))?;
        self.shared.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(full_name, gauge.clone());
        Ok(gauge)
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, sanitize(name))
    }
}

/// Map a name onto the Prometheus metric-name charset
fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Per-context counters, bumped by the transport layer
#[derive(Clone)]
pub struct ContextStats {
    /// Completed handshakes
    pub handshake: IntCounter,
    /// Connections that failed during or after the handshake
    pub connection_error: IntCounter,
    /// Peers that presented no certificate when one was expected
    pub no_certificate: IntCounter,
    /// Peer certificates that failed verification
    pub fail_verify_error: IntCounter,
    /// Handshakes that resumed a session
    pub session_reused: IntCounter,
}

impl fmt::Debug for ContextStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStats")
            .field("handshake", &self.handshake.get())
            .field("connection_error", &self.connection_error.get())
            .field("no_certificate", &self.no_certificate.get())
            .field("fail_verify_error", &self.fail_verify_error.get())
            .field("session_reused", &self.session_reused.get())
            .finish()
    }
}

impl ContextStats {
    /// Register (or reuse) the context counters under `scope`
    pub fn register(scope: &StatsScope) -> ContextResult<Self> {
        Ok(Self {
            handshake: scope.counter("ssl_handshake_total", "Completed TLS handshakes")?,
            connection_error: scope
                .counter("ssl_connection_error_total", "TLS connection errors")?,
            no_certificate: scope.counter(
                "ssl_no_certificate_total",
                "Peers that presented no certificate",
            )?,
            fail_verify_error: scope.counter(
                "ssl_fail_verify_error_total",
                "Peer certificates that failed verification",
            )?,
            session_reused: scope
                .counter("ssl_session_reused_total", "Resumed TLS sessions")?,
        })
    }
}

/// Manager-wide lifecycle counters and gauges
#[derive(Clone)]
pub(crate) struct ManagerStats {
    pub(crate) created: IntCounter,
    pub(crate) rotated: IntCounter,
    pub(crate) released: IntCounter,
    pub(crate) deduplicated: IntCounter,
    pub(crate) live: IntGauge,
    pub(crate) retired: IntGauge,
}

impl ManagerStats {
    pub(crate) fn register(scope: &StatsScope) -> ContextResult<Self> {
        Ok(Self {
            created: scope.counter("contexts_created_total", "TLS contexts constructed")?,
            rotated: scope.counter("contexts_rotated_total", "TLS context rotations")?,
            released: scope.counter("contexts_released_total", "TLS context releases")?,
            deduplicated: scope.counter(
                "contexts_deduplicated_total",
                "Create or update requests served by an existing context",
            )?,
            live: scope.gauge("contexts_live", "Live TLS contexts")?,
            retired: scope.gauge("contexts_retired", "Retired TLS contexts still draining")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("listener.0.0.0.0:443"), "listener_0_0_0_0:443");
        assert_eq!(sanitize("443"), "_443");
        assert_eq!(sanitize(""), "_");
        assert_eq!(sanitize("ssl_handshake"), "ssl_handshake");
    }

    #[test]
    fn test_child_scope_prefix() {
        let root = StatsScope::isolated();
        let child = root.scope("listener.https").scope("sni");
        assert_eq!(child.prefix(), "listener_https_sni_");
    }

    #[test]
    fn test_counter_is_shared_by_name() {
        let scope = StatsScope::isolated().scope("listener");
        let a = scope.counter("ssl_handshake_total", "help").unwrap();
        let b = scope.counter("ssl_handshake_total", "help").unwrap();
        a.inc();
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn test_context_stats_shared_across_registrations() {
        let scope = StatsScope::isolated().scope("listener_443");
        let first = ContextStats::register(&scope).unwrap();
        let second = ContextStats::register(&scope).unwrap();
        first.handshake.inc_by(3);
        assert_eq!(second.handshake.get(), 3);

        let exposition = prometheus::TextEncoder::new()
            .encode_to_string(&scope.registry().gather())
            .unwrap();
        assert!(exposition.contains("listener_443_ssl_handshake_total 3"));
    }

    #[test]
    fn test_sibling_scopes_are_distinct() {
        let root = StatsScope::isolated();
        let a = ContextStats::register(&root.scope("a")).unwrap();
        let b = ContextStats::register(&root.scope("b")).unwrap();
        a.handshake.inc();
        assert_eq!(b.handshake.get(), 0);
    }

    #[test]
    fn test_second_root_over_shared_registry_conflicts() {
        let registry = Registry::new();
        let root = StatsScope::new(registry.clone());
        let clone = root.clone();
        ContextStats::register(&root.scope("listener")).unwrap();
        assert!(ContextStats::register(&clone.scope("listener")).is_ok());

        let second_root = StatsScope::new(registry);
        let result = ContextStats::register(&second_root.scope("listener"));
        assert!(matches!(result, Err(crate::ContextError::Stats(_))));
        assert!(ContextStats::register(&second_root.scope("other")).is_ok());
    }

    #[test]
    fn test_manager_stats_register() {
        let scope = StatsScope::isolated().scope("ssl_context_manager");
        let stats = ManagerStats::register(&scope).unwrap();
        stats.live.set(2);
        assert_eq!(ManagerStats::register(&scope).unwrap().live.get(), 2);
    }
}

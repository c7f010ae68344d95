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

//! Common fixtures for context manager integration tests.
//!
//! Every fixture pins a [`ManualTimeSource`] to the wall clock at creation
//! and issues leaves one hour past a whole number of days, so expiry
//! queries return exact day counts while rustls still sees valid
//! certificates.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

pub use sslctx_test_utils::{unix_now, IssuedCert, TestPki, DAY};

use chrono::DateTime;
use sslctx_manager::{
    ClientContextConfig, ContextManager, ManagerSettings, ManualTimeSource, ServerContextConfig,
    StaticSecretManager, StatsScope, TlsCertificate, ValidationContext,
};
use std::sync::Arc;

/// Slack added past whole days so the floor lands on the intended count.
pub const HOUR: i64 = 3_600;

/// A manager wired to a manual clock, a test CA and an in-memory secret store.
pub struct Fixture {
    pub now: i64,
    pub pki: TestPki,
    pub clock: Arc<ManualTimeSource>,
    pub secrets: Arc<StaticSecretManager>,
    pub scope: StatsScope,
    pub manager: Arc<ContextManager>,
}

impl Fixture {
    pub fn start() -> Self {
        Self::with_settings(ManagerSettings::default())
    }

    pub fn with_settings(settings: ManagerSettings) -> Self {
        let now = unix_now();
        let pki = TestPki::new("sslctx Test CA", now + 3650 * DAY);
        let clock = Arc::new(ManualTimeSource::new(
            DateTime::from_timestamp(now, 0).unwrap(),
        ));
        let secrets = Arc::new(StaticSecretManager::new());
        let scope = StatsScope::isolated();

        let manager = ContextManager::builder()
            .secret_manager(Arc::<StaticSecretManager>::clone(&secrets))
            .time_source(Arc::<ManualTimeSource>::clone(&clock))
            .settings(settings)
            .stats_scope(scope.clone())
            .build()
            .unwrap();

        Self {
            now,
            pki,
            clock,
            secrets,
            scope,
            manager: Arc::new(manager),
        }
    }

    /// Leaf for `names` expiring `days` whole days from the fixture clock.
    pub fn leaf(&self, names: &[&str], days: i64) -> IssuedCert {
        self.pki.issue(names, self.now + days * DAY + HOUR)
    }

    /// Server config serving `leaf` with its chain.
    pub fn server_config_for(&self, leaf: &IssuedCert) -> ServerContextConfig {
        ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem(
                leaf.chain_pem.as_bytes(),
                leaf.key_pem.as_bytes(),
            ))
            .alpn("h2")
            .alpn("http/1.1")
            .build()
            .unwrap()
    }

    /// Server config with a fresh leaf for `names` expiring in `days`.
    pub fn server_config(&self, names: &[&str], days: i64) -> ServerContextConfig {
        self.server_config_for(&self.leaf(names, days))
    }

    /// Client config trusting the fixture CA.
    pub fn client_config(&self, sni: &str) -> ClientContextConfig {
        ClientContextConfig::builder()
            .trusted_ca(ValidationContext::from_pem(self.pki.ca_pem().as_bytes()))
            .alpn("h2")
            .server_name_indication(sni)
            .build()
            .unwrap()
    }

    /// Scope for one listener's contexts.
    pub fn listener_scope(&self, name: &str) -> StatsScope {
        self.scope.scope(name)
    }
}

pub fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

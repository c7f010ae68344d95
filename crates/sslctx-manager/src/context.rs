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
//! Immutable TLS contexts
//!
//! A [`Context`] bundles parsed certificate metadata with the handshake
//! parameters built by the TLS engine. Nothing in a context changes after
//! construction; rotation always produces a new context.

use chrono::{DateTime, Utc};
use rustls::{ClientConfig, ServerConfig};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::CertificateChain;
use crate::config::{feed, ClientContextConfig, ServerContextConfig};
use crate::expiry::days_between;
use crate::stats::ContextStats;

/// Shared handle to a context
pub type SharedContext = Arc<Context>;

/// Configuration fingerprint identifying a context
///
/// Two requests with the same role, server names and material produce the
/// same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(String);

impl ContextId {
    #[cfg(test)]
    pub(crate) fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub(crate) fn for_client(config: &ClientContextConfig) -> Self {
        let mut hasher = Sha256::new();
        feed(&mut hasher, ContextRole::Client.tag());
        config.fingerprint_into(&mut hasher);
        Self(hex::encode(hasher.finalize()))
    }

    pub(crate) fn for_server(config: &ServerContextConfig, server_names: &[String]) -> Self {
        let mut hasher = Sha256::new();
        feed(&mut hasher, ContextRole::Server.tag());
        feed(&mut hasher, &(server_names.len() as u64).to_be_bytes());
        for name in server_names {
            feed(&mut hasher, name.as_bytes());
        }
        config.fingerprint_into(&mut hasher);
        Self(hex::encode(hasher.finalize()))
    }

    /// Full hex fingerprint
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated fingerprint for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of a connection a context serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextRole {
    /// The proxy originates TLS
    Client,
    /// The proxy terminates TLS
    Server,
}

impl ContextRole {
    fn tag(self) -> &'static [u8] {
        match self {
            ContextRole::Client => b"client",
            ContextRole::Server => b"server",
        }
    }
}

impl fmt::Display for ContextRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextRole::Client => write!(f, "client"),
            ContextRole::Server => write!(f, "server"),
        }
    }
}

/// Registry slot that owns a context's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SlotId(pub(crate) u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of the manager that issued a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ManagerId(u64);

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

impl ManagerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client-side handshake parameters
#[derive(Debug)]
pub struct ClientContext {
    server_name_indication: Option<String>,
    tls: Arc<ClientConfig>,
}

impl ClientContext {
    /// SNI to send upstream
    pub fn server_name_indication(&self) -> Option<&str> {
        self.server_name_indication.as_deref()
    }

    /// rustls configuration for new outbound connections
    pub fn tls_config(&self) -> &Arc<ClientConfig> {
        &self.tls
    }
}

/// Server-side handshake parameters
#[derive(Debug)]
pub struct ServerContext {
    server_names: Vec<String>,
    tls: Arc<ServerConfig>,
}

impl ServerContext {
    /// Server names this context answers for, in configured order
    ///
    /// Empty means the context is a catch-all.
    pub fn server_names(&self) -> &[String] {
        &self.server_names
    }

    /// Whether this context should serve a connection for `sni`
    ///
    /// Names match exactly (case-insensitive) or through a leading `*.`
    /// wildcard covering a single label.
    pub fn answers_for(&self, sni: &str) -> bool {
        if self.server_names.is_empty() {
            return true;
        }
        let sni = sni.to_ascii_lowercase();
        self.server_names.iter().any(|name| {
            let name = name.to_ascii_lowercase();
            match name.strip_prefix("*.") {
                Some(suffix) => sni
                    .split_once('.')
                    .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
                None => name == sni,
            }
        })
    }

    /// rustls configuration for new inbound connections
    pub fn tls_config(&self) -> &Arc<ServerConfig> {
        &self.tls
    }
}

/// Role-specific part of a context
#[derive(Debug)]
pub enum ContextKind {
    /// Outbound TLS
    Client(ClientContext),
    /// Inbound TLS
    Server(ServerContext),
}

impl ContextKind {
    pub(crate) fn client(server_name_indication: Option<String>, tls: Arc<ClientConfig>) -> Self {
        ContextKind::Client(ClientContext {
            server_name_indication,
            tls,
        })
    }

    pub(crate) fn server(server_names: Vec<String>, tls: Arc<ServerConfig>) -> Self {
        ContextKind::Server(ServerContext { server_names, tls })
    }

    /// Role of this context
    pub fn role(&self) -> ContextRole {
        match self {
            ContextKind::Client(_) => ContextRole::Client,
            ContextKind::Server(_) => ContextRole::Server,
        }
    }
}

/// An immutable TLS context
pub struct Context {
    id: ContextId,
    owner: ManagerId,
    slot: SlotId,
    kind: ContextKind,
    cert_chains: Vec<CertificateChain>,
    ca_chain: Option<CertificateChain>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    stats: ContextStats,
}

/// Everything needed to assemble a [`Context`] except its registry slot
pub(crate) struct ContextParts {
    pub(crate) id: ContextId,
    pub(crate) kind: ContextKind,
    pub(crate) cert_chains: Vec<CertificateChain>,
    pub(crate) ca_chain: Option<CertificateChain>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) stats: ContextStats,
}

impl Context {
    pub(crate) fn assemble(parts: ContextParts, owner: ManagerId, slot: SlotId) -> Self {
        Self {
            id: parts.id,
            owner,
            slot,
            kind: parts.kind,
            cert_chains: parts.cert_chains,
            ca_chain: parts.ca_chain,
            expires_at: parts.expires_at,
            created_at: parts.created_at,
            stats: parts.stats,
        }
    }

    /// Configuration fingerprint
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Client or server
    pub fn role(&self) -> ContextRole {
        self.kind.role()
    }

    /// Role-specific handshake parameters
    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    /// Client parameters, if this is a client context
    pub fn as_client(&self) -> Option<&ClientContext> {
        match &self.kind {
            ContextKind::Client(client) => Some(client),
            ContextKind::Server(_) => None,
        }
    }

    /// Server parameters, if this is a server context
    pub fn as_server(&self) -> Option<&ServerContext> {
        match &self.kind {
            ContextKind::Server(server) => Some(server),
            ContextKind::Client(_) => None,
        }
    }

    /// Server names for server contexts, empty for client contexts
    pub fn server_names(&self) -> &[String] {
        self.as_server().map(ServerContext::server_names).unwrap_or_default()
    }

    /// Earliest `not_after` across every chain and trust root held
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Certificate chains presented by this context
    pub fn cert_chain_info(&self) -> &[CertificateChain] {
        &self.cert_chains
    }

    /// Trust roots used to verify peers
    pub fn ca_cert_info(&self) -> Option<&CertificateChain> {
        self.ca_chain.as_ref()
    }

    /// Whole days until the earliest certificate expires
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires_at.map(|expires_at| days_between(now, expires_at))
    }

    /// When the context was built
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Per-context counters
    pub fn stats(&self) -> &ContextStats {
        &self.stats
    }

    pub(crate) fn owner(&self) -> ManagerId {
        self.owner
    }

    pub(crate) fn slot(&self) -> SlotId {
        self.slot
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id.short())
            .field("role", &self.role())
            .field("slot", &self.slot)
            .field("server_names", &self.server_names())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

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
//! Secret manager for dynamically delivered certificate material
//!
//! The context manager never fetches secrets itself; it only exposes the
//! secret manager so configuration can be resolved against it. Delivery
//! subsystems push material in with [`SecretManager::add_or_update_tls_certificate`]
//! and rotation drivers learn about new versions through [`SecretManager::subscribe`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::TlsCertificate;

/// Source of named TLS certificate secrets
pub trait SecretManager: Send + Sync + fmt::Debug {
    /// Store or replace a certificate secret, returning its new version
    fn add_or_update_tls_certificate(&self, name: &str, certificate: TlsCertificate) -> u64;

    /// Look up the current material for a secret
    fn find_tls_certificate(&self, name: &str) -> Option<TlsCertificate>;

    /// Drop a secret; subscribers observe their channel closing
    fn remove_tls_certificate(&self, name: &str) -> bool;

    /// Watch a secret's version; the receiver fires on every update
    ///
    /// Subscribing to a name that has not been delivered yet is allowed and
    /// yields version 0 until the first update arrives.
    fn subscribe(&self, name: &str) -> watch::Receiver<u64>;
}

struct SecretEntry {
    certificate: Option<TlsCertificate>,
    version: u64,
    notify: watch::Sender<u64>,
}

impl SecretEntry {
    fn empty() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            certificate: None,
            version: 0,
            notify,
        }
    }
}

/// In-memory secret manager
#[derive(Default)]
pub struct StaticSecretManager {
    secrets: RwLock<HashMap<String, SecretEntry>>,
}

impl fmt::Debug for StaticSecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = secrets.keys().collect();
        names.sort();
        f.debug_struct("StaticSecretManager")
            .field("secrets", &names)
            .finish()
    }
}

impl StaticSecretManager {
    /// Create an empty secret manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of secrets currently holding material
    pub fn len(&self) -> usize {
        self.secrets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.certificate.is_some())
            .count()
    }

    /// Whether no secret currently holds material
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretManager for StaticSecretManager {
    fn add_or_update_tls_certificate(&self, name: &str, certificate: TlsCertificate) -> u64 {
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        let entry = secrets
            .entry(name.to_string())
            .or_insert_with(SecretEntry::empty);

        entry.certificate = Some(certificate);
        entry.version += 1;
        entry.notify.send_replace(entry.version);

        info!(secret = %name, version = entry.version, "TLS certificate secret updated");
        entry.version
    }

    fn find_tls_certificate(&self, name: &str) -> Option<TlsCertificate> {
        self.secrets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|entry| entry.certificate.clone())
    }

    fn remove_tls_certificate(&self, name: &str) -> bool {
        let removed = self
            .secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some_and(|entry| entry.certificate.is_some());

        if removed {
            info!(secret = %name, "TLS certificate secret removed");
        }
        removed
    }

    fn subscribe(&self, name: &str) -> watch::Receiver<u64> {
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        let entry = secrets
            .entry(name.to_string())
            .or_insert_with(SecretEntry::empty);

        debug!(secret = %name, version = entry.version, "Subscribed to TLS certificate secret");
        entry.notify.subscribe()
    }
}

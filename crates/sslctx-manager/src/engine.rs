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
//! TLS engine seam
//!
//! The manager never performs handshakes. It hands parsed material to a
//! [`TlsEngine`], which turns it into handshake parameters. [`RustlsEngine`]
//! is the default and produces `rustls` client and server configurations.

use rustls::client::ResolvesClientCert;
use rustls::crypto::{ring, CryptoProvider};
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, ServerConfig, SignatureScheme, SupportedProtocolVersion};
use std::fmt;
use std::sync::Arc;

use crate::chain::{ParsedIdentity, ParsedMaterial};
use crate::config::{ClientContextConfig, CommonTlsConfig, ServerContextConfig, TlsVersion};
use crate::error::{ContextError, ContextResult};

/// Builds handshake parameters from parsed configuration
pub trait TlsEngine: Send + Sync + fmt::Debug {
    /// Build parameters for originating TLS
    fn build_client(
        &self,
        config: &ClientContextConfig,
        material: &ParsedMaterial,
    ) -> ContextResult<Arc<ClientConfig>>;

    /// Build parameters for terminating TLS for `server_names`
    fn build_server(
        &self,
        config: &ServerContextConfig,
        server_names: &[String],
        material: &ParsedMaterial,
    ) -> ContextResult<Arc<ServerConfig>>;
}

/// rustls-backed engine using the `ring` crypto provider
#[derive(Debug, Clone)]
pub struct RustlsEngine {
    provider: Arc<CryptoProvider>,
}

impl Default for RustlsEngine {
    fn default() -> Self {
        Self::with_provider(Arc::new(ring::default_provider()))
    }
}

impl RustlsEngine {
    /// Engine with the default provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a caller-supplied provider
    pub fn with_provider(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }

    fn certified_keys(&self, identities: &[ParsedIdentity]) -> ContextResult<Vec<Arc<CertifiedKey>>> {
        identities
            .iter()
            .map(|identity| {
                let signing_key = self
                    .provider
                    .key_provider
                    .load_private_key(identity.key().clone_key())
                    .map_err(|e| {
                        ContextError::invalid_configuration(format!(
                            "unusable private key for {}: {}",
                            identity.chain().info().source,
                            e
                        ))
                    })?;
                Ok(Arc::new(CertifiedKey::new(
                    identity.chain().der().to_vec(),
                    signing_key,
                )))
            })
            .collect()
    }
}

impl TlsEngine for RustlsEngine {
    fn build_client(
        &self,
        config: &ClientContextConfig,
        material: &ParsedMaterial,
    ) -> ContextResult<Arc<ClientConfig>> {
        let roots = root_store(material)?;
        let builder = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(&protocol_versions(&config.common))
            .map_err(|e| tls_error("client", e))?
            .with_root_certificates(roots);

        let mut tls = match material.identities() {
            [] => builder.with_no_client_auth(),
            [identity] => builder
                .with_client_auth_cert(identity.chain().der().to_vec(), identity.key().clone_key())
                .map_err(|e| tls_error("client", e))?,
            identities => builder.with_client_cert_resolver(Arc::new(AgileCertResolver {
                keys: self.certified_keys(identities)?,
            })),
        };
        tls.alpn_protocols = alpn_protocols(&config.common);

        Ok(Arc::new(tls))
    }

    fn build_server(
        &self,
        config: &ServerContextConfig,
        _server_names: &[String],
        material: &ParsedMaterial,
    ) -> ContextResult<Arc<ServerConfig>> {
        let builder = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(&protocol_versions(&config.common))
            .map_err(|e| tls_error("server", e))?;

        let builder = match material.trust() {
            Some(_) => {
                let roots = Arc::new(root_store(material)?);
                let verifier =
                    WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(&self.provider));
                let verifier = if config.require_client_certificate {
                    verifier
                } else {
                    verifier.allow_unauthenticated()
                };
                let verifier = verifier.build().map_err(|e| {
                    ContextError::invalid_configuration(format!(
                        "failed to build client certificate verifier: {}",
                        e
                    ))
                })?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let mut tls = match material.identities() {
            [] => {
                return Err(ContextError::invalid_configuration(
                    "server contexts require at least one certificate",
                ))
            }
            [identity] => builder
                .with_single_cert(identity.chain().der().to_vec(), identity.key().clone_key())
                .map_err(|e| tls_error("server", e))?,
            identities => builder.with_cert_resolver(Arc::new(AgileCertResolver {
                keys: self.certified_keys(identities)?,
            })),
        };
        tls.alpn_protocols = alpn_protocols(&config.common);

        Ok(Arc::new(tls))
    }
}

fn tls_error(role: &str, error: rustls::Error) -> ContextError {
    ContextError::invalid_configuration(format!("failed to build {} TLS config: {}", role, error))
}

fn protocol_versions(common: &CommonTlsConfig) -> Vec<&'static SupportedProtocolVersion> {
    [
        (TlsVersion::V1_2, &rustls::version::TLS12),
        (TlsVersion::V1_3, &rustls::version::TLS13),
    ]
    .into_iter()
    .filter(|(version, _)| {
        *version >= common.min_protocol_version && *version <= common.max_protocol_version
    })
    .map(|(_, supported)| supported)
    .collect()
}

fn alpn_protocols(common: &CommonTlsConfig) -> Vec<Vec<u8>> {
    common
        .alpn_protocols
        .iter()
        .map(|protocol| protocol.as_bytes().to_vec())
        .collect()
}

fn root_store(material: &ParsedMaterial) -> ContextResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    if let Some(trust) = material.trust() {
        let (added, ignored) = roots.add_parsable_certificates(trust.der().iter().cloned());
        if added == 0 {
            return Err(ContextError::invalid_configuration(format!(
                "no usable trust anchors in {} ({} rejected)",
                trust.info().source,
                ignored
            )));
        }
    }
    Ok(roots)
}

/// Picks among several certified keys by the peer's signature schemes
///
/// Used when a context carries more than one chain, e.g. ECDSA and RSA
/// side by side.
struct AgileCertResolver {
    keys: Vec<Arc<CertifiedKey>>,
}

impl AgileCertResolver {
    fn select(&self, offered: &[SignatureScheme]) -> Option<Arc<CertifiedKey>> {
        self.keys
            .iter()
            .find(|key| key.key.choose_scheme(offered).is_some())
            .map(Arc::clone)
    }
}

impl fmt::Debug for AgileCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgileCertResolver")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl ResolvesServerCert for AgileCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.select(client_hello.signature_schemes())
    }
}

impl ResolvesClientCert for AgileCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.select(sigschemes)
    }

    fn has_certs(&self) -> bool {
        !self.keys.is_empty()
    }
}

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
//! TLS context configuration objects
//!
//! These are the inbound, already-resolved inputs to the context manager:
//! certificate/key material, trust roots and protocol parameters for client
//! and server contexts. [`CertificateSource`] covers the resolution step for
//! callers that describe material by file path or secret name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::error::{ContextError, ContextResult};
use crate::secret::SecretManager;

/// Where a piece of certificate material came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MaterialSource {
    /// Supplied directly as bytes
    Inline,
    /// Read from a file on disk
    File(PathBuf),
    /// Delivered through the secret manager under this name
    Secret(String),
}

impl fmt::Display for MaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialSource::Inline => write!(f, "<inline>"),
            MaterialSource::File(path) => write!(f, "{}", path.display()),
            MaterialSource::Secret(name) => write!(f, "secret:{}", name),
        }
    }
}

/// TLS version
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    /// TLS 1.2
    V1_2,
    /// TLS 1.3
    V1_3,
}

impl TlsVersion {
    fn tag(self) -> u8 {
        match self {
            TlsVersion::V1_2 => 2,
            TlsVersion::V1_3 => 3,
        }
    }
}

/// A certificate chain (PEM, leaf first) and its private key (PEM)
///
/// The key bytes are zeroized on drop.
#[derive(Clone)]
pub struct TlsCertificate {
    certificate_chain: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
    source: MaterialSource,
}

impl fmt::Debug for TlsCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCertificate")
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("private_key", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

impl TlsCertificate {
    /// Create certificate material from PEM bytes
    pub fn from_pem(certificate_chain: impl Into<Vec<u8>>, private_key: impl Into<Vec<u8>>) -> Self {
        Self {
            certificate_chain: certificate_chain.into(),
            private_key: Zeroizing::new(private_key.into()),
            source: MaterialSource::Inline,
        }
    }

    /// Load certificate material from PEM files
    pub fn from_files<P: AsRef<Path>>(cert_path: P, key_path: P) -> ContextResult<Self> {
        let certificate_chain = std::fs::read(cert_path.as_ref())?;
        let private_key = Zeroizing::new(std::fs::read(key_path.as_ref())?);

        Ok(Self {
            certificate_chain,
            private_key,
            source: MaterialSource::File(cert_path.as_ref().to_path_buf()),
        })
    }

    /// Record where this material came from
    pub fn with_source(mut self, source: MaterialSource) -> Self {
        self.source = source;
        self
    }

    /// PEM-encoded certificate chain
    pub fn certificate_chain(&self) -> &[u8] {
        &self.certificate_chain
    }

    /// PEM-encoded private key
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Origin of the material
    pub fn source(&self) -> &MaterialSource {
        &self.source
    }
}

/// How a [`TlsCertificate`] should be obtained
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CertificateSource {
    /// PEM files on disk
    File {
        /// Certificate chain path
        cert_path: PathBuf,
        /// Private key path
        key_path: PathBuf,
    },
    /// PEM text embedded in the configuration
    Inline {
        /// Certificate chain PEM
        certificate_chain: String,
        /// Private key PEM
        private_key: String,
    },
    /// A named secret held by the secret manager
    Secret {
        /// Secret name
        name: String,
    },
}

impl fmt::Debug for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateSource::File { cert_path, key_path } => f
                .debug_struct("File")
                .field("cert_path", cert_path)
                .field("key_path", key_path)
                .finish(),
            CertificateSource::Inline { certificate_chain, .. } => f
                .debug_struct("Inline")
                .field("certificate_chain_len", &certificate_chain.len())
                .field("private_key", &"<redacted>")
                .finish(),
            CertificateSource::Secret { name } => {
                f.debug_struct("Secret").field("name", name).finish()
            }
        }
    }
}

impl CertificateSource {
    /// Resolve to concrete certificate material
    pub fn resolve(&self, secrets: &dyn SecretManager) -> ContextResult<TlsCertificate> {
        match self {
            CertificateSource::File { cert_path, key_path } => {
                TlsCertificate::from_files(cert_path, key_path)
            }
            CertificateSource::Inline {
                certificate_chain,
                private_key,
            } => Ok(TlsCertificate::from_pem(
                certificate_chain.as_bytes(),
                private_key.as_bytes(),
            )),
            CertificateSource::Secret { name } => secrets
                .find_tls_certificate(name)
                .map(|certificate| certificate.with_source(MaterialSource::Secret(name.clone())))
                .ok_or_else(|| ContextError::SecretNotFound(name.clone())),
        }
    }
}

/// Trust roots used to verify the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    trusted_ca: Vec<u8>,
    source: MaterialSource,
}

impl ValidationContext {
    /// Trust the CA certificates in this PEM bundle
    pub fn from_pem(trusted_ca: impl Into<Vec<u8>>) -> Self {
        Self {
            trusted_ca: trusted_ca.into(),
            source: MaterialSource::Inline,
        }
    }

    /// Trust the CA certificates in a PEM file
    pub fn from_file(path: impl AsRef<Path>) -> ContextResult<Self> {
        Ok(Self {
            trusted_ca: std::fs::read(path.as_ref())?,
            source: MaterialSource::File(path.as_ref().to_path_buf()),
        })
    }

    /// PEM-encoded CA bundle
    pub fn trusted_ca(&self) -> &[u8] {
        &self.trusted_ca
    }

    /// Origin of the CA bundle
    pub fn source(&self) -> &MaterialSource {
        &self.source
    }
}

/// Settings shared by client and server contexts
#[derive(Debug, Clone)]
pub struct CommonTlsConfig {
    /// Certificate chains with their keys; more than one enables algorithm agility
    pub tls_certificates: Vec<TlsCertificate>,

    /// Trust roots for verifying the peer
    pub validation_context: Option<ValidationContext>,

    /// ALPN protocols in preference order
    pub alpn_protocols: Vec<String>,

    /// Lowest protocol version offered
    pub min_protocol_version: TlsVersion,

    /// Highest protocol version offered
    pub max_protocol_version: TlsVersion,
}

impl Default for CommonTlsConfig {
    fn default() -> Self {
        Self {
            tls_certificates: Vec::new(),
            validation_context: None,
            alpn_protocols: Vec::new(),
            min_protocol_version: TlsVersion::V1_2,
            max_protocol_version: TlsVersion::V1_3,
        }
    }
}

impl CommonTlsConfig {
    /// Structural validation; cryptographic validation happens when the context is built
    pub fn validate(&self) -> ContextResult<()> {
        if self.min_protocol_version > self.max_protocol_version {
            return Err(ContextError::invalid_configuration(format!(
                "minimum protocol version {:?} is above maximum {:?}",
                self.min_protocol_version, self.max_protocol_version
            )));
        }

        if self.alpn_protocols.iter().any(|p| p.is_empty() || p.len() > 255) {
            return Err(ContextError::invalid_configuration(
                "ALPN protocol names must be 1-255 bytes",
            ));
        }

        Ok(())
    }

    fn fingerprint_into(&self, hasher: &mut Sha256) {
        feed(hasher, &(self.tls_certificates.len() as u64).to_be_bytes());
        for certificate in &self.tls_certificates {
            feed(hasher, certificate.certificate_chain());
            feed(hasher, certificate.private_key());
        }
        match &self.validation_context {
            Some(validation) => feed(hasher, validation.trusted_ca()),
            None => feed(hasher, b""),
        }
        feed(hasher, &(self.alpn_protocols.len() as u64).to_be_bytes());
        for protocol in &self.alpn_protocols {
            feed(hasher, protocol.as_bytes());
        }
        feed(
            hasher,
            &[self.min_protocol_version.tag(), self.max_protocol_version.tag()],
        );
    }
}

/// Configuration for a context used when the proxy originates TLS
#[derive(Debug, Clone, Default)]
pub struct ClientContextConfig {
    /// Shared TLS settings
    pub common: CommonTlsConfig,

    /// SNI sent to upstreams
    pub server_name_indication: Option<String>,
}

impl ClientContextConfig {
    /// Start building a client configuration
    pub fn builder() -> ClientContextConfigBuilder {
        ClientContextConfigBuilder::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> ContextResult<()> {
        self.common.validate()?;

        if self.common.validation_context.is_none() {
            return Err(ContextError::invalid_configuration(
                "client contexts require a trusted CA",
            ));
        }

        if let Some(sni) = &self.server_name_indication {
            if sni.is_empty() {
                return Err(ContextError::invalid_configuration(
                    "server name indication must not be empty",
                ));
            }
        }

        Ok(())
    }

    pub(crate) fn fingerprint_into(&self, hasher: &mut Sha256) {
        self.common.fingerprint_into(hasher);
        feed(
            hasher,
            self.server_name_indication.as_deref().unwrap_or_default().as_bytes(),
        );
    }
}

/// Configuration for a context used when the proxy terminates TLS
#[derive(Debug, Clone, Default)]
pub struct ServerContextConfig {
    /// Shared TLS settings
    pub common: CommonTlsConfig,

    /// Reject clients that do not present a certificate signed by the trusted CA
    pub require_client_certificate: bool,
}

impl ServerContextConfig {
    /// Start building a server configuration
    pub fn builder() -> ServerContextConfigBuilder {
        ServerContextConfigBuilder::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> ContextResult<()> {
        self.common.validate()?;

        if self.common.tls_certificates.is_empty() {
            return Err(ContextError::invalid_configuration(
                "server contexts require at least one certificate",
            ));
        }

        if self.require_client_certificate && self.common.validation_context.is_none() {
            return Err(ContextError::invalid_configuration(
                "client certificates are required but no trusted CA is configured",
            ));
        }

        Ok(())
    }

    /// Validate configuration together with the names it will serve
    ///
    /// An empty list is a catch-all; empty names are rejected.
    pub fn validate_for(&self, server_names: &[String]) -> ContextResult<()> {
        self.validate()?;

        if let Some(name) = server_names.iter().find(|name| name.is_empty()) {
            return Err(ContextError::invalid_configuration(format!(
                "invalid server name {:?}",
                name
            )));
        }

        Ok(())
    }

    pub(crate) fn fingerprint_into(&self, hasher: &mut Sha256) {
        self.common.fingerprint_into(hasher);
        feed(hasher, &[u8::from(self.require_client_certificate)]);
    }
}

/// Length-prefixed hashing so adjacent fields cannot alias
pub(crate) fn feed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Client configuration builder
#[derive(Default)]
pub struct ClientContextConfigBuilder {
    config: ClientContextConfig,
}

impl ClientContextConfigBuilder {
    /// Present this certificate to upstreams (mTLS)
    pub fn certificate(mut self, certificate: TlsCertificate) -> Self {
        self.config.common.tls_certificates.push(certificate);
        self
    }

    /// Verify upstreams against these roots
    pub fn trusted_ca(mut self, validation: ValidationContext) -> Self {
        self.config.common.validation_context = Some(validation);
        self
    }

    /// Offer an ALPN protocol
    pub fn alpn(mut self, protocol: impl Into<String>) -> Self {
        self.config.common.alpn_protocols.push(protocol.into());
        self
    }

    /// Restrict protocol versions
    pub fn protocol_versions(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.config.common.min_protocol_version = min;
        self.config.common.max_protocol_version = max;
        self
    }

    /// Set the SNI sent upstream
    pub fn server_name_indication(mut self, name: impl Into<String>) -> Self {
        self.config.server_name_indication = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContextResult<ClientContextConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Server configuration builder
#[derive(Default)]
pub struct ServerContextConfigBuilder {
    config: ServerContextConfig,
}

impl ServerContextConfigBuilder {
    /// Serve this certificate
    pub fn certificate(mut self, certificate: TlsCertificate) -> Self {
        self.config.common.tls_certificates.push(certificate);
        self
    }

    /// Verify client certificates against these roots
    pub fn trusted_ca(mut self, validation: ValidationContext) -> Self {
        self.config.common.validation_context = Some(validation);
        self
    }

    /// Offer an ALPN protocol
    pub fn alpn(mut self, protocol: impl Into<String>) -> Self {
        self.config.common.alpn_protocols.push(protocol.into());
        self
    }

    /// Restrict protocol versions
    pub fn protocol_versions(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.config.common.min_protocol_version = min;
        self.config.common.max_protocol_version = max;
        self
    }

    /// Enable mutual TLS
    pub fn require_client_certificate(mut self) -> Self {
        self.config.require_client_certificate = true;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContextResult<ServerContextConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::secret::StaticSecretManager;

    fn digest(config: &ServerContextConfig) -> Vec<u8> {
        let mut hasher = Sha256::new();
        config.fingerprint_into(&mut hasher);
        hasher.finalize().to_vec()
    }

    #[test]
    fn test_server_config_requires_certificate() {
        let result = ServerContextConfig::builder().build();
        assert!(matches!(result, Err(ContextError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_client_config_requires_trusted_ca() {
        let result = ClientContextConfig::builder().server_name_indication("upstream").build();
        assert!(result.is_err());

        let config = ClientContextConfig::builder()
            .trusted_ca(ValidationContext::from_pem("ca"))
            .build()
            .unwrap();
        assert!(config.server_name_indication.is_none());
    }

    #[test]
    fn test_protocol_range_validated() {
        let result = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("cert", "key"))
            .protocol_versions(TlsVersion::V1_3, TlsVersion::V1_2)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_mtls_requires_trusted_ca() {
        let result = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("cert", "key"))
            .require_client_certificate()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_server_names_validated() {
        let config = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("cert", "key"))
            .build()
            .unwrap();

        assert!(config.validate_for(&[]).is_ok());
        assert!(config.validate_for(&["example.com".to_string()]).is_ok());
        assert!(matches!(
            config.validate_for(&["example.com".to_string(), String::new()]),
            Err(ContextError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_fingerprint_ignores_source_but_not_material() {
        let a = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("cert", "key"))
            .build()
            .unwrap();
        let b = ServerContextConfig::builder()
            .certificate(
                TlsCertificate::from_pem("cert", "key")
                    .with_source(MaterialSource::Secret("web".to_string())),
            )
            .build()
            .unwrap();
        let c = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("cert", "other-key"))
            .build()
            .unwrap();

        assert_eq!(digest(&a), digest(&b));
        assert_ne!(digest(&a), digest(&c));
    }

    #[test]
    fn test_fingerprint_length_prefixing() {
        let a = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("ab", "c"))
            .build()
            .unwrap();
        let b = ServerContextConfig::builder()
            .certificate(TlsCertificate::from_pem("a", "bc"))
            .build()
            .unwrap();
        assert_ne!(digest(&a), digest(&b));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let certificate = TlsCertificate::from_pem("cert", "super-secret-key");
        let rendered = format!("{:?}", certificate);
        assert!(!rendered.contains("super-secret-key"));

        let source = CertificateSource::Inline {
            certificate_chain: "cert".to_string(),
            private_key: "super-secret-key".to_string(),
        };
        assert!(!format!("{:?}", source).contains("super-secret-key"));
    }

    #[test]
    fn test_resolve_secret_source() {
        let secrets = StaticSecretManager::new();
        let source = CertificateSource::Secret {
            name: "web".to_string(),
        };
        assert!(matches!(
            source.resolve(&secrets),
            Err(ContextError::SecretNotFound(_))
        ));

        secrets.add_or_update_tls_certificate("web", TlsCertificate::from_pem("cert", "key"));
        let resolved = source.resolve(&secrets).unwrap();
        assert_eq!(resolved.certificate_chain(), b"cert");
        assert_eq!(resolved.source(), &MaterialSource::Secret("web".to_string()));
    }

    #[test]
    fn test_resolve_file_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, "cert").unwrap();
        std::fs::write(&key_path, "key").unwrap();

        let source = CertificateSource::File {
            cert_path: cert_path.clone(),
            key_path,
        };
        let resolved = source.resolve(&StaticSecretManager::new()).unwrap();
        assert_eq!(resolved.private_key(), b"key");
        assert_eq!(resolved.source(), &MaterialSource::File(cert_path));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = CertificateSource::File {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        };
        assert!(matches!(
            source.resolve(&StaticSecretManager::new()),
            Err(ContextError::Io(_))
        ));
    }

    #[test]
    fn test_certificate_source_deserializes() {
        let source: CertificateSource = toml::from_str(
            r#"
            type = "secret"
            name = "edge-cert"
            "#,
        )
        .unwrap();
        assert_eq!(
            source,
            CertificateSource::Secret {
                name: "edge-cert".to_string()
            }
        );
    }
}

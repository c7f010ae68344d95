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
//! Certificate chain parsing
//!
//! Turns PEM material into DER certificates plus the metadata the manager
//! needs for expiration tracking and introspection (serial, subject, SANs,
//! validity window).

use chrono::{DateTime, Utc};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use crate::config::{CommonTlsConfig, MaterialSource, TlsCertificate};
use crate::error::{ContextError, ContextResult};

/// Metadata extracted from a single certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    /// Hex-encoded serial number
    pub serial_number: String,
    /// Subject distinguished name
    pub subject: String,
    /// DNS subject alternative names
    pub subject_alt_names: Vec<String>,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
}

impl CertificateDetails {
    /// Whole days until `not_after`, or 0 if already expired
    pub fn days_until_expiration(&self, now: DateTime<Utc>) -> u64 {
        crate::expiry::days_between(now, self.not_after)
    }
}

/// A parsed certificate chain (leaf first) and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    /// Origin of the material
    pub source: MaterialSource,
    /// Per-certificate details, in chain order
    pub certificates: Vec<CertificateDetails>,
}

impl CertificateChain {
    /// Earliest `not_after` in the chain
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.certificates.iter().map(|cert| cert.not_after).min()
    }

    /// The leaf certificate, if any
    pub fn leaf(&self) -> Option<&CertificateDetails> {
        self.certificates.first()
    }
}

/// DER certificates together with their parsed details
#[derive(Debug)]
pub struct ParsedChain {
    der: Vec<CertificateDer<'static>>,
    info: CertificateChain,
}

impl ParsedChain {
    /// DER-encoded certificates, leaf first
    pub fn der(&self) -> &[CertificateDer<'static>] {
        &self.der
    }

    /// Parsed details
    pub fn info(&self) -> &CertificateChain {
        &self.info
    }
}

/// A certificate chain paired with its private key
pub struct ParsedIdentity {
    chain: ParsedChain,
    key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for ParsedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedIdentity")
            .field("chain", &self.chain)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl ParsedIdentity {
    /// The certificate chain
    pub fn chain(&self) -> &ParsedChain {
        &self.chain
    }

    /// The private key
    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }
}

/// Everything parsed out of a [`CommonTlsConfig`]
#[derive(Debug)]
pub struct ParsedMaterial {
    identities: Vec<ParsedIdentity>,
    trust: Option<ParsedChain>,
}

impl ParsedMaterial {
    /// Parse all certificate chains, keys and trust roots of a configuration
    pub fn from_config(config: &CommonTlsConfig) -> ContextResult<Self> {
        let identities = config
            .tls_certificates
            .iter()
            .map(parse_identity)
            .collect::<ContextResult<Vec<_>>>()?;

        let trust = config
            .validation_context
            .as_ref()
            .map(|validation| parse_certificates(validation.trusted_ca(), validation.source()))
            .transpose()?;

        Ok(Self { identities, trust })
    }

    /// Certificate chains with keys
    pub fn identities(&self) -> &[ParsedIdentity] {
        &self.identities
    }

    /// Trust roots, if configured
    pub fn trust(&self) -> Option<&ParsedChain> {
        self.trust.as_ref()
    }

    /// Earliest `not_after` across every chain and the trust roots
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.identities
            .iter()
            .map(|identity| &identity.chain.info)
            .chain(self.trust.iter().map(|trust| &trust.info))
            .filter_map(CertificateChain::expires_at)
            .min()
    }

    pub(crate) fn into_info(self) -> (Vec<CertificateChain>, Option<CertificateChain>) {
        let chains = self
            .identities
            .into_iter()
            .map(|identity| identity.chain.info)
            .collect();
        (chains, self.trust.map(|trust| trust.info))
    }
}

fn parse_identity(certificate: &TlsCertificate) -> ContextResult<ParsedIdentity> {
    let chain = parse_certificates(certificate.certificate_chain(), certificate.source())?;
    let key = parse_private_key(certificate.private_key(), certificate.source())?;
    Ok(ParsedIdentity { chain, key })
}

/// Parse every certificate in a PEM bundle
pub fn parse_certificates(pem: &[u8], source: &MaterialSource) -> ContextResult<ParsedChain> {
    let der = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            ContextError::invalid_configuration(format!(
                "failed to read certificates from {}: {}",
                source, e
            ))
        })?;

    if der.is_empty() {
        return Err(ContextError::invalid_configuration(format!(
            "no certificates found in {}",
            source
        )));
    }

    let certificates = der
        .iter()
        .map(|cert| inspect_certificate(cert, source))
        .collect::<ContextResult<Vec<_>>>()?;

    Ok(ParsedChain {
        der,
        info: CertificateChain {
            source: source.clone(),
            certificates,
        },
    })
}

/// Parse the first private key in a PEM bundle (PKCS#8, PKCS#1 or SEC1)
pub fn parse_private_key(pem: &[u8], source: &MaterialSource) -> ContextResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| {
            ContextError::invalid_configuration(format!(
                "failed to read private key from {}: {}",
                source, e
            ))
        })?
        .ok_or_else(|| {
            ContextError::invalid_configuration(format!("no private key found in {}", source))
        })
}

/// Extract expiration and identity metadata from a DER certificate
pub fn inspect_certificate(
    der: &CertificateDer<'_>,
    source: &MaterialSource,
) -> ContextResult<CertificateDetails> {
    let (_, cert) = parse_x509_certificate(der.as_ref()).map_err(|e| {
        ContextError::invalid_configuration(format!(
            "failed to parse X.509 certificate from {}: {}",
            source, e
        ))
    })?;

    let validity = cert.validity();
    let not_before = asn1_to_utc(&validity.not_before, source)?;
    let not_after = asn1_to_utc(&validity.not_after, source)?;

    let mut subject_alt_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                subject_alt_names.push(dns.to_string());
            }
        }
    }

    Ok(CertificateDetails {
        serial_number: hex::encode(cert.raw_serial()),
        subject: cert.subject().to_string(),
        subject_alt_names,
        not_before,
        not_after,
    })
}

fn asn1_to_utc(time: &ASN1Time, source: &MaterialSource) -> ContextResult<DateTime<Utc>> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or_else(|| {
        ContextError::invalid_configuration(format!(
            "certificate validity out of range in {}",
            source
        ))
    })
}

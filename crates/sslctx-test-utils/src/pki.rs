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

//! Certificate fixtures.
//!
//! Validity bounds are whole unix seconds so expiration tests can assert
//! exact day counts.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;

/// Seconds in a day.
pub const DAY: i64 = 86_400;

/// Current unix time in whole seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock before unix epoch")
        .as_secs() as i64
}

fn timestamp(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).expect("Timestamp out of range")
}

/// A leaf certificate issued by a [`TestPki`].
#[derive(Debug, Clone)]
pub struct IssuedCert {
    /// Leaf certificate only.
    pub cert_pem: String,
    /// Leaf private key (PKCS#8).
    pub key_pem: String,
    /// Leaf followed by the issuing CA.
    pub chain_pem: String,
}

/// Self-signed CA for tests.
pub struct TestPki {
    ca_cert: Certificate,
    ca_key: KeyPair,
    ca_pem: String,
}

impl TestPki {
    /// Create a CA valid from one day ago until `not_after` (unix seconds).
    pub fn new(common_name: &str, not_after: i64) -> Self {
        let ca_key = KeyPair::generate().expect("Failed to generate CA key");
        let mut params = CertificateParams::new(Vec::<String>::new())
            .expect("Failed to create CA parameters");
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.not_before = timestamp(not_before(not_after));
        params.not_after = timestamp(not_after);

        let ca_cert = params.self_signed(&ca_key).expect("Failed to self-sign CA");
        let ca_pem = ca_cert.pem();

        Self {
            ca_cert,
            ca_key,
            ca_pem,
        }
    }

    /// CA certificate PEM, for trust roots.
    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    /// Issue a leaf for `names` (DNS SANs) expiring at `not_after`.
    pub fn issue(&self, names: &[&str], not_after: i64) -> IssuedCert {
        let key = KeyPair::generate().expect("Failed to generate leaf key");
        let sans: Vec<String> = names.iter().map(|name| name.to_string()).collect();
        let mut params = CertificateParams::new(sans).expect("Invalid subject alternative names");
        if let Some(first) = names.first() {
            params.distinguished_name.push(DnType::CommonName, *first);
        }
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.not_before = timestamp(not_before(not_after));
        params.not_after = timestamp(not_after);

        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("Failed to sign leaf certificate");
        let cert_pem = cert.pem();

        IssuedCert {
            chain_pem: format!("{}{}", cert_pem, self.ca_pem),
            cert_pem,
            key_pem: key.serialize_pem(),
        }
    }
}

fn not_before(not_after: i64) -> i64 {
    unix_now().min(not_after) - DAY
}

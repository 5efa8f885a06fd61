// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Throwaway certificate authority writing PEM files the way operators deploy them

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::path::PathBuf;
use tempfile::TempDir;
use volley::tls::MutualTls;

pub struct TestPki {
    dir: TempDir,
    ca: Certificate,
    ca_key: KeyPair,
    ca_path: PathBuf,
}

impl TestPki {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create certificate dir");
        let ca_key = KeyPair::generate().expect("ca key");
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, "volley-test-ca");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = params.self_signed(&ca_key).expect("ca cert");

        let ca_path = dir.path().join("ca.crt");
        std::fs::write(&ca_path, ca.pem()).expect("write ca");
        Self {
            dir,
            ca,
            ca_key,
            ca_path,
        }
    }

    /// Writes a certificate for `name` signed by this CA. The returned bundle verifies peers
    /// against `name` too.
    pub fn issue(&self, stem: &str, name: &str) -> MutualTls {
        let key = KeyPair::generate().expect("leaf key");
        let mut params = CertificateParams::new(vec![name.to_string()]).expect("leaf params");
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let cert = params
            .signed_by(&key, &self.ca, &self.ca_key)
            .expect("leaf cert");

        let cert_path = self.dir.path().join(format!("{stem}.crt"));
        let key_path = self.dir.path().join(format!("{stem}.key"));
        std::fs::write(&cert_path, cert.pem()).expect("write cert");
        std::fs::write(&key_path, key.serialize_pem()).expect("write key");
        MutualTls {
            cert_path,
            key_path,
            ca_path: self.ca_path.clone(),
            server_name: name.to_string(),
        }
    }
}

/// Server configuration with a self-signed certificate no client trusts, and no client auth.
pub fn self_signed_server_config() -> rustls::ServerConfig {
    let cert = rcgen::generate_simple_self_signed(vec!["traffic-controller".to_string()])
        .expect("self-signed cert");
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    rustls::ServerConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .expect("protocols")
        .with_no_client_auth()
        .with_single_cert(
            vec![CertificateDer::from(cert.cert)],
            PrivateKeyDer::Pkcs8(key),
        )
        .expect("server config")
}

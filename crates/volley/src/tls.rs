// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! rustls configurations for the three TLS surfaces: the mutually authenticated provisioning
//! listener, the mutually authenticated v2 gateway client, and the v1 consumer which accepts any
//! server certificate.

use crate::errors::TlsError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Certificate, key and CA bundle for one side of a mutually authenticated connection.
///
/// `server_name` is the name the peer certificate is verified against when acting as a client,
/// regardless of the host in the URL being dialed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutualTls {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
    pub server_name: String,
}

impl MutualTls {
    /// Server side: present our certificate, require a client certificate signed by the CA.
    pub fn server_config(&self) -> Result<ServerConfig, TlsError> {
        let provider = provider();
        let roots = load_roots(&self.ca_path)?;
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()?;

        Ok(ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(load_certs(&self.cert_path)?, load_key(&self.key_path)?)?)
    }

    /// Client side: present our certificate, require a server certificate signed by the CA and
    /// valid for `server_name`.
    pub fn client_config(&self) -> Result<ClientConfig, TlsError> {
        let provider = provider();
        let roots = load_roots(&self.ca_path)?;
        let name = ServerName::try_from(self.server_name.clone())
            .map_err(|_| TlsError::ServerName(self.server_name.clone()))?;
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .build()?;

        Ok(ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PinnedNameVerifier { inner, name }))
            .with_client_auth_cert(load_certs(&self.cert_path)?, load_key(&self.key_path)?)?)
    }
}

/// Client configuration that accepts whatever certificate the server presents. Handshake
/// signatures are still checked.
pub fn insecure_client_config() -> Result<ClientConfig, TlsError> {
    let provider = provider();
    Ok(ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        .with_no_client_auth())
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(crypto::ring::default_provider())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .map_err(|source| TlsError::Pem {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| TlsError::Pem {
        path: path.display().to_string(),
        source,
    })
}

fn load_roots(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

/// Web PKI verification against a fixed name instead of the dialed host.
#[derive(Debug)]
struct PinnedNameVerifier {
    inner: Arc<WebPkiServerVerifier>,
    name: ServerName<'static>,
}

impl ServerCertVerifier for PinnedNameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, intermediates, &self.name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    fn write_bundle(dir: &Path, server_name: &str) -> MutualTls {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = CertificateParams::new(vec![server_name.to_string()])
            .unwrap()
            .signed_by(&leaf_key, &ca, &ca_key)
            .unwrap();

        let tls = MutualTls {
            cert_path: dir.join("cert.pem"),
            key_path: dir.join("key.pem"),
            ca_path: dir.join("ca.pem"),
            server_name: server_name.to_string(),
        };
        std::fs::write(&tls.cert_path, leaf.pem()).unwrap();
        std::fs::write(&tls.key_path, leaf_key.serialize_pem()).unwrap();
        std::fs::write(&tls.ca_path, ca.pem()).unwrap();
        tls
    }

    #[test]
    fn test_builds_both_sides_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let tls = write_bundle(dir.path(), "reverselogproxy");

        assert!(tls.server_config().is_ok());
        assert!(tls.client_config().is_ok());
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut tls = write_bundle(dir.path(), "localhost");
        tls.ca_path = dir.path().join("absent.pem");

        let err = tls.server_config().unwrap_err();
        assert!(matches!(err, TlsError::Pem { ref path, .. } if path.ends_with("absent.pem")));
    }

    #[test]
    fn test_empty_ca_bundle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut tls = write_bundle(dir.path(), "localhost");
        tls.ca_path = dir.path().join("empty.pem");
        std::fs::write(&tls.ca_path, "").unwrap();

        assert!(matches!(
            tls.client_config(),
            Err(TlsError::NoCertificates(_))
        ));
    }

    #[test]
    fn test_invalid_server_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut tls = write_bundle(dir.path(), "localhost");
        tls.server_name = "not a name".to_string();

        assert!(matches!(tls.client_config(), Err(TlsError::ServerName(_))));
    }

    #[test]
    fn test_insecure_client_config_builds() {
        let config = insecure_client_config().unwrap();
        assert!(!config.client_auth_cert_resolver.has_certs());
    }
}

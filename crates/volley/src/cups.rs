// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock user-provided service provider. Every request is answered with a fresh set of drain
//! bindings for sampled source identifiers, which makes a syslog binding poller see churn.

use crate::constants::{DRAIN_VERSION_SUFFIX, PROVISIONED_HOSTNAME};
use crate::errors::ProvisioningError;
use crate::id_store::IdStore;
use crate::tls::MutualTls;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{header, http, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rand::seq::IndexedRandom;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

#[derive(Debug, Serialize, PartialEq)]
pub struct Binding {
    pub drains: Vec<String>,
    pub hostname: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BindingsResponse {
    pub results: HashMap<String, Binding>,
}

pub struct CupsHandler {
    id_store: Arc<dyn IdStore>,
    drain_urls: Vec<String>,
    drain_count: usize,
}

impl CupsHandler {
    pub fn new(id_store: Arc<dyn IdStore>, drain_urls: Vec<String>, drain_count: usize) -> Self {
        CupsHandler {
            id_store,
            drain_urls,
            drain_count,
        }
    }

    /// Binds each of up to `drain_count` sampled identifiers to one random drain URL. Never waits
    /// for the identifier store to fill up.
    pub fn bindings(&self) -> BindingsResponse {
        let mut results = HashMap::new();
        if self.drain_urls.is_empty() {
            return BindingsResponse { results };
        }

        let mut rng = rand::rng();
        for id in self.id_store.get_n(self.drain_count) {
            let Some(drain) = self.drain_urls.choose(&mut rng) else {
                continue;
            };
            results.insert(
                id,
                Binding {
                    drains: vec![format!("{drain}{DRAIN_VERSION_SUFFIX}")],
                    hostname: PROVISIONED_HOSTNAME.to_string(),
                },
            );
        }
        BindingsResponse { results }
    }

    fn respond(&self, req: &Request<Incoming>) -> http::Result<Response<Full<Bytes>>> {
        debug!("Serving drain bindings for {} {}", req.method(), req.uri());
        match serde_json::to_vec(&self.bindings()) {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body))),
            Err(e) => {
                error!("Failed to encode drain bindings: {e}");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::new()))
            }
        }
    }
}

/// Binds `0.0.0.0:<port>` and serves `handler` until the listener fails. With `tls`, every client
/// must present a certificate signed by its CA.
pub async fn listen_and_serve(
    port: u16,
    handler: Arc<CupsHandler>,
    tls: Option<&MutualTls>,
) -> Result<(), ProvisioningError> {
    let acceptor = match tls {
        Some(tls) => Some(TlsAcceptor::from(Arc::new(tls.server_config()?))),
        None => None,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    match tls {
        Some(tls) => info!(
            "Provisioning server listening on {addr} with mutual TLS as {}",
            tls.server_name
        ),
        None => info!("Provisioning server listening on {addr} over plain HTTP"),
    }
    Ok(serve_tcp(listener, handler, acceptor).await?)
}

pub async fn serve_tcp(
    listener: TcpListener,
    handler: Arc<CupsHandler>,
    tls: Option<TlsAcceptor>,
) -> Result<(), io::Error> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Provisioning server error: {e}");
                    return Err(e);
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
        };

        let server = server.clone();
        let handler = Arc::clone(&handler);
        let tls = tls.clone();
        joinset.spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let response = handler.respond(&req);
                async move { response }
            });
            let served = match tls {
                Some(acceptor) => match acceptor.accept(conn).await {
                    Ok(stream) => server.serve_connection(TokioIo::new(stream), service).await,
                    Err(e) => {
                        debug!("TLS handshake failed: {e}");
                        return;
                    }
                },
                None => server.serve_connection(TokioIo::new(conn), service).await,
            };
            if let Err(e) = served {
                debug!("Connection error: {e}");
            }
        });
    }
}

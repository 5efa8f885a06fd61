// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::interval;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use volley::{
    config::Config,
    cups::{self, CupsHandler},
    id_store::{IdStore, WeightedIdStore},
    killer::Killer,
    syslog_registrar::SyslogRegistrar,
    transport::gateway::GatewayClient,
    v1::{self, ConnectionSettings, EgressV1, EgressV1Counts},
    v2::{self, EgressV2, EgressV2Counts},
};

use volley_metrics::{
    aggregator_service::{AggregatorHandle, AggregatorService},
    constants::CONTEXTS,
    flusher::{Flusher, FlusherConfig},
    metric::EMPTY_TAGS,
    sink::MetricSink,
};

#[tokio::main]
pub async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading volley configuration: {e}");
            return;
        }
    };

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,tungstenite=off,{}",
        config.log_level
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Volley started");
    debug!("Configuration: {config:?}");

    let id_store: Arc<dyn IdStore> = Arc::new(WeightedIdStore::new(config.id_store_capacity()));

    let (metrics_flusher, aggregator_handle) =
        match start_metrics(config.metron_port, config.metric_namespace.clone()) {
            Ok(started) => started,
            Err(e) => {
                error!("Failed to start metrics aggregation: {e}");
                return;
            }
        };
    let sink: Arc<dyn MetricSink> = Arc::new(aggregator_handle);

    let cups_handler = Arc::new(CupsHandler::new(
        Arc::clone(&id_store),
        config.syslog_drain_urls.clone(),
        config.syslog_drains,
    ));
    let cups_port = config.cups_port;
    let cups_tls = config.cups_tls.clone();
    tokio::spawn(async move {
        if let Err(e) = cups::listen_and_serve(cups_port, cups_handler, cups_tls.as_ref()).await {
            error!("Provisioning server stopped: {e}");
        }
    });

    let v1_manager = match v1::ConnectionManager::from_addrs(
        &config.tc_addrs,
        ConnectionSettings {
            auth_token: config.auth_token.clone(),
            subscription_id: config.subscription_id.clone(),
            receive_delay: config.receive_delay,
        },
        Arc::clone(&id_store),
        Arc::clone(&sink),
    ) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to create v1 connection manager: {e}");
            return;
        }
    };
    let egress_v1 = EgressV1::new(
        v1_manager,
        EgressV1Counts {
            firehose: config.firehose_count,
            stream: config.stream_count,
            recent_log: config.recent_log_count,
            container_metric: config.container_metric_count,
        },
        config.async_request_delay,
    );
    let _v1_tasks = egress_v1.start();

    let _v2_tasks = if config.rlp_addrs.is_empty() {
        debug!("No RLP_ADDRS configured, v2 egress disabled");
        None
    } else {
        let gateway_client = match GatewayClient::new(config.v2_tls.as_ref()) {
            Ok(client) => client.with_preferred_tags(config.use_preferred_tags),
            Err(e) => {
                error!("Failed to build v2 gateway client: {e}");
                return;
            }
        };
        match v2::ConnectionManager::new(
            config.rlp_addrs.clone(),
            config.receive_delay,
            Arc::clone(&sink),
            Arc::new(gateway_client),
        ) {
            Ok(manager) => {
                let egress_v2 = EgressV2::new(
                    Arc::new(manager),
                    Arc::clone(&id_store),
                    EgressV2Counts {
                        firehose: config.firehose_count,
                        app_stream: config.stream_count,
                        app_log_stream: config.stream_count,
                    },
                );
                Some(egress_v2.start())
            }
            Err(e) => {
                error!("Failed to create v2 connection manager: {e}");
                return;
            }
        }
    };

    if !config.kill_delay.is_zero_width() {
        match Killer::for_process(config.kill_delay) {
            Ok(killer) => {
                killer.start();
            }
            Err(e) => {
                error!("Invalid KILL_DELAY: {e}");
                return;
            }
        }
    }

    if !config.syslog_drain_urls.is_empty() {
        match SyslogRegistrar::new(
            config.syslog_ttl,
            config.syslog_drains,
            config.syslog_drain_urls.clone(),
            config.etcd_addrs.clone(),
            Arc::clone(&id_store),
        ) {
            Ok(registrar) => {
                tokio::spawn(async move { registrar.start().await });
            }
            Err(e) => error!("Failed to create syslog registrar: {e}"),
        }
    }

    let mut flush_interval = interval(config.metric_batch_interval);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    let mut unsent = Vec::new();
    loop {
        flush_interval.tick().await;

        if !unsent.is_empty() {
            debug!("Retrying {} unsent counters", unsent.len());
            if let Some(failed) = metrics_flusher.flush_counters(unsent).await {
                error!("Dropping {} counters that could not be sent twice", failed.len());
            }
        }
        debug!("Flushing volley metrics");
        unsent = metrics_flusher.flush().await.unwrap_or_default();
    }
}

fn start_metrics(
    metron_port: u16,
    namespace: Option<String>,
) -> Result<(Flusher, AggregatorHandle), volley_metrics::errors::Creation> {
    let (service, handle) = AggregatorService::new(EMPTY_TAGS, CONTEXTS)?;
    tokio::spawn(service.run());

    let flusher = Flusher::new(FlusherConfig {
        aggregator_handle: handle.clone(),
        target: SocketAddr::from(([127, 0, 0, 1], metron_port)),
        namespace,
    });
    Ok((flusher, handle))
}

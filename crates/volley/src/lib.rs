// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Volley opens and churns large numbers of consumer connections against a log and metric
//! egress pipeline.
//!
//! Source identifiers observed on live traffic are fed into a weighted
//! [`id_store::WeightedIdStore`], which in turn decides which sources the per-source streams,
//! one-shot requests and advertised syslog drains target.

pub mod config;
pub mod constants;
pub mod cups;
pub mod delay_range;
pub mod envelope;
pub mod errors;
pub mod id_store;
pub mod killer;
pub mod registry;
pub mod syslog_registrar;
pub mod tls;
pub mod transport;
pub mod v1;
pub mod v2;

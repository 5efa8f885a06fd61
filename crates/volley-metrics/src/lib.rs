// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Counter batching for volley.
//!
//! Components record counters through the [`sink::MetricSink`] trait. The
//! process-wide sink is an [`aggregator_service::AggregatorHandle`], which sums
//! deltas per `(name, tags)` context until the [`flusher::Flusher`] drains them
//! and ships DogStatsD counter lines over UDP.

pub mod aggregator;
pub mod aggregator_service;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod metric;
pub mod sink;
pub mod util;

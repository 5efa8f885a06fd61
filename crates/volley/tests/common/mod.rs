// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities, spies, and mock servers for integration tests

#![allow(dead_code)]

pub mod certs;
pub mod helpers;
pub mod mocks;

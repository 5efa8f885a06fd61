// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Second-generation egress: selector-scoped receive streams that are torn down and reopened
//! continuously.

use crate::envelope::Selector;
use async_trait::async_trait;

pub mod connection_manager;
pub mod egress;

pub use connection_manager::{ConnectionManager, ReconnectPolicy, StreamLifetime};
pub use egress::{EgressV2, EgressV2Counts};

#[async_trait]
pub trait Assaulter: Send + Sync {
    /// Opens receive streams for `selector` one after another, forever.
    async fn assault(&self, selector: Selector);
}

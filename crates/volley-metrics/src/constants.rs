// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Default upper bound on distinct `(name, tags)` counter contexts held between flushes.
pub const CONTEXTS: usize = 10_240;

/// Largest datagram the flusher builds before starting a new one.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Namespace prepended to every counter name when none is configured.
pub const DEFAULT_NAMESPACE: &str = "volley";

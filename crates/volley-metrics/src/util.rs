// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Validates a counter namespace: it must start with an ASCII letter and may only contain
/// ASCII alphanumerics, underscores and periods. Surrounding whitespace is ignored.
///
/// An empty string means "no namespace" and yields `None` silently; anything else that
/// fails validation is logged and dropped.
///
/// ```
/// use volley_metrics::util::parse_metric_namespace;
///
/// assert_eq!(parse_metric_namespace(" volley "), Some("volley".to_string()));
/// assert_eq!(parse_metric_namespace("volley.loadtest"), Some("volley.loadtest".to_string()));
/// assert_eq!(parse_metric_namespace("9volley"), None);
/// assert_eq!(parse_metric_namespace("vol-ley"), None);
/// ```
pub fn parse_metric_namespace(namespace: &str) -> Option<String> {
    let trimmed = namespace.trim();
    let first = trimmed.chars().next()?;

    if !first.is_ascii_alphabetic() {
        tracing::error!("Metric namespace must start with a letter, got '{trimmed}'. Ignoring it.");
        return None;
    }

    if let Some(invalid) = trimmed
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.')
    {
        tracing::error!(
            "Metric namespace '{trimmed}' contains invalid character '{invalid}'. Ignoring it."
        );
        return None;
    }

    Some(trimmed.to_string())
}

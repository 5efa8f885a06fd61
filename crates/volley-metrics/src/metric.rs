// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::fmt::Write as _;
use ustr::{ustr, Ustr};

pub const EMPTY_TAGS: SortedTags = SortedTags { values: Vec::new() };

/// Key/value tags kept sorted so that equal tag sets hash to the same aggregation context
/// regardless of the order callers attached them in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SortedTags {
    values: Vec<(Ustr, Ustr)>,
}

impl SortedTags {
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut values: Vec<(Ustr, Ustr)> = pairs
            .into_iter()
            .map(|(k, v)| (ustr(k), ustr(v)))
            .collect();
        values.sort_by(|a, b| (a.0.as_str(), a.1.as_str()).cmp(&(b.0.as_str(), b.1.as_str())));
        values.dedup();
        SortedTags { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns the first value attached to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for SortedTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write!(f, "{}:{}", sanitize_tag(k), sanitize_tag(v))?;
        }
        Ok(())
    }
}

/// A monotonic counter delta for one `(name, tags)` context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counter {
    pub name: Ustr,
    pub tags: SortedTags,
    pub value: u64,
}

impl Counter {
    pub fn new(name: &str, tags: SortedTags, value: u64) -> Self {
        Counter {
            name: ustr(name),
            tags,
            value,
        }
    }

    /// Renders the counter as a DogStatsD line, e.g. `volley.open_connections:3|c|#conn_type:stream`.
    pub fn to_dogstatsd(&self, namespace: Option<&str>) -> String {
        let mut line = String::with_capacity(64);
        if let Some(namespace) = namespace {
            line.push_str(namespace);
            line.push('.');
        }
        line.push_str(&sanitize_name(&self.name));
        let _ = write!(line, ":{}|c", self.value);
        if !self.tags.is_empty() {
            let _ = write!(line, "|#{}", self.tags);
        }
        line
    }
}

/// Metric names on the wire only carry ASCII alphanumerics, underscores and periods.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ',' separates tags and '|' separates sections, neither may appear inside a tag.
fn sanitize_tag(tag: &str) -> String {
    tag.replace([',', '|', '\n'], "_")
}

//! Combining two documents by identity.
//!
//! Merge upserts routes and clusters by id: existing entries are replaced in
//! place, new ones are appended in incoming order, and nothing is ever
//! removed. Replace takes the incoming document as is.

use std::fmt;
use std::str::FromStr;

use crate::document::{ClusterEntry, ConfigurationDocument, RouteEntry};

/// How an imported document is combined with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportStrategy {
    /// Update existing entries, add new ones.
    #[default]
    Merge,
    /// Incoming document supersedes everything.
    Replace,
}

impl FromStr for ImportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(ImportStrategy::Merge),
            "replace" => Ok(ImportStrategy::Replace),
            other => Err(format!("unknown import strategy '{other}' (expected merge or replace)")),
        }
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStrategy::Merge => f.write_str("merge"),
            ImportStrategy::Replace => f.write_str("replace"),
        }
    }
}

/// Entries that are reconciled by an identity key.
trait Keyed: Clone {
    fn key(&self) -> &str;
}

impl Keyed for RouteEntry {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for ClusterEntry {
    fn key(&self) -> &str {
        &self.id
    }
}

fn upsert_all<T: Keyed>(current: &[T], incoming: &[T]) -> Vec<T> {
    let mut merged = current.to_vec();
    for entry in incoming {
        match merged.iter().position(|e| e.key() == entry.key()) {
            Some(index) => merged[index] = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    merged
}

/// Upsert every entry of `incoming` into `current`.
pub fn merge(current: &ConfigurationDocument, incoming: &ConfigurationDocument) -> ConfigurationDocument {
    ConfigurationDocument {
        routes: upsert_all(&current.routes, &incoming.routes),
        clusters: upsert_all(&current.clusters, &incoming.clusters),
    }
}

/// The incoming document, unchanged.
pub fn replace(_current: &ConfigurationDocument, incoming: &ConfigurationDocument) -> ConfigurationDocument {
    incoming.clone()
}

/// Combine documents with the chosen strategy.
pub fn reconcile(
    current: &ConfigurationDocument,
    incoming: &ConfigurationDocument,
    strategy: ImportStrategy,
) -> ConfigurationDocument {
    match strategy {
        ImportStrategy::Merge => merge(current, incoming),
        ImportStrategy::Replace => replace(current, incoming),
    }
}

//! Dual-tier cache for file metadata and analysis results.
//!
//! Two independent namespaces with their own TTLs, consulted before any
//! external lookup. Caching is advisory: a broken backend degrades the
//! pipeline to full pass-through, it never fails a request. This is the
//! deliberate opposite of the gateway's strict failure propagation.

pub mod backend;

use crate::config::CacheConfig;
use crate::types::{AnalysisResult, AnalysisType, FileRecord};
use backend::{CacheBackend, StoredEntry};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

const NS_METADATA: &str = "metadata";
const NS_ANALYSIS: &str = "analysis";

/// Why a cached analysis entry was rejected. Freshness-token mismatch is
/// checked first: an edited file goes stale before its TTL expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    TokenMismatch,
    TtlExpired,
}

/// Staleness of a cached analysis entry against the current source
/// modification timestamp. Token mismatch always wins over TTL.
pub fn analysis_staleness(
    entry: &StoredEntry,
    current_modified: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Staleness {
    match entry.freshness_token {
        Some(token) if token != current_modified => Staleness::TokenMismatch,
        // A missing token can never be proven fresh.
        None => Staleness::TokenMismatch,
        _ if entry.is_expired(now) => Staleness::TtlExpired,
        _ => Staleness::Fresh,
    }
}

/// The metadata/analysis cache shared by the processor and the graph walker.
pub struct DualTierCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl DualTierCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Cached metadata for a file, if present and inside its TTL.
    pub async fn get_metadata(&self, scope: &str, file_id: &str) -> Option<FileRecord> {
        let key = metadata_key(scope, file_id);
        let entry = match self.backend.get(NS_METADATA, &key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "metadata cache read failed, treating as miss");
                return None;
            }
        };
        if entry.is_expired(Utc::now()) {
            return None;
        }
        match serde_json::from_str(&entry.payload) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, error = %e, "cached metadata undecodable, treating as miss");
                None
            }
        }
    }

    /// Write a metadata copy. Failures are dropped.
    pub async fn set_metadata(&self, scope: &str, file_id: &str, record: &FileRecord) {
        let key = metadata_key(scope, file_id);
        let payload = match serde_json::to_string(record) {
            Ok(p) => p,
            Err(e) => {
                warn!(key, error = %e, "metadata not serializable, skipping cache write");
                return;
            }
        };
        let now = Utc::now();
        let entry = StoredEntry {
            payload,
            written_at: now,
            freshness_token: Some(record.modified_at),
            expires_at: now + ttl_chrono(self.config.metadata_ttl()),
        };
        if let Err(e) = self.backend.set(NS_METADATA, &key, entry).await {
            warn!(key, error = %e, "metadata cache write dropped");
        }
    }

    /// Cached analysis for (file, type set), if fresh against
    /// `current_modified`.
    pub async fn get_analysis(
        &self,
        scope: &str,
        file_id: &str,
        types: &BTreeSet<AnalysisType>,
        current_modified: DateTime<Utc>,
    ) -> Option<AnalysisResult> {
        let key = analysis_key(scope, file_id, types);
        let entry = match self.backend.get(NS_ANALYSIS, &key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "analysis cache read failed, treating as miss");
                return None;
            }
        };
        if analysis_staleness(&entry, current_modified, Utc::now()) != Staleness::Fresh {
            return None;
        }
        match serde_json::from_str(&entry.payload) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(key, error = %e, "cached analysis undecodable, treating as miss");
                None
            }
        }
    }

    /// Write an analysis result keyed by the type set, stamping the source
    /// modification timestamp as the freshness token. Failures are dropped.
    pub async fn set_analysis(
        &self,
        scope: &str,
        file_id: &str,
        types: &BTreeSet<AnalysisType>,
        result: &AnalysisResult,
        freshness_token: DateTime<Utc>,
    ) {
        let key = analysis_key(scope, file_id, types);
        let payload = match serde_json::to_string(result) {
            Ok(p) => p,
            Err(e) => {
                warn!(key, error = %e, "analysis not serializable, skipping cache write");
                return;
            }
        };
        let now = Utc::now();
        let entry = StoredEntry {
            payload,
            written_at: now,
            freshness_token: Some(freshness_token),
            expires_at: now + ttl_chrono(self.config.analysis_ttl()),
        };
        if let Err(e) = self.backend.set(NS_ANALYSIS, &key, entry).await {
            warn!(key, error = %e, "analysis cache write dropped");
        }
    }
}

fn metadata_key(scope: &str, file_id: &str) -> String {
    format!("{scope}:{file_id}")
}

/// The sorted type set is part of the key: an entry computed for `{sharing}`
/// must not satisfy `{sharing, migration}`.
fn analysis_key(scope: &str, file_id: &str, types: &BTreeSet<AnalysisType>) -> String {
    let set = types
        .iter()
        .map(AnalysisType::as_str)
        .collect::<Vec<_>>()
        .join("+");
    format!("{scope}:{file_id}:{set}")
}

fn ttl_chrono(ttl: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(3600))
}

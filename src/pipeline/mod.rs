//! File/drive processor: the top-level pipeline.
//!
//! Per file: cache check → metadata refresh (skipped on fresh hit) →
//! orchestrated analysis (skipped on fresh hit) → cache write-back. Many
//! files are scheduled through fixed-size windows dispatched concurrently;
//! a window is awaited as a whole before the next one starts, with a short
//! pacing delay in between. A single file's failure is captured as an error
//! outcome and never fails its window.

pub mod progress;

use crate::analysis::Orchestrator;
use crate::cache::DualTierCache;
use crate::config::Config;
use crate::drive::ClientPool;
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::types::{AnalysisType, FileOutcome, FileRecord, UserAggregate};
use futures::future::join_all;
use progress::{ProgressEvent, ProgressObserver};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Full report of one user-scope run.
#[derive(Debug, Clone)]
pub struct UserRunReport {
    pub run_id: Uuid,
    pub scope: String,
    pub outcomes: Vec<FileOutcome>,
    pub aggregate: UserAggregate,
}

/// Drives files through the cache-aware analysis pipeline.
pub struct FileProcessor {
    pool: Arc<ClientPool>,
    gateway: Arc<Gateway>,
    cache: Arc<DualTierCache>,
    orchestrator: Orchestrator,
    config: Arc<Config>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl FileProcessor {
    pub fn new(
        pool: Arc<ClientPool>,
        gateway: Arc<Gateway>,
        cache: Arc<DualTierCache>,
        config: Arc<Config>,
    ) -> Self {
        let orchestrator = Orchestrator::new(pool.clone(), gateway.clone(), config.clone());
        Self {
            pool,
            gateway,
            cache,
            orchestrator,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    /// Run one file through the pipeline. Never fails: every unrecovered
    /// error becomes an error outcome carrying the file id, scope, message
    /// and elapsed time.
    pub async fn process_file(
        &self,
        scope: &str,
        file_id: &str,
        types: &BTreeSet<AnalysisType>,
    ) -> FileOutcome {
        let started = Instant::now();
        self.emit(ProgressEvent::CacheCheck {
            file_id: file_id.to_string(),
        });

        match self.process_inner(scope, file_id, types).await {
            Ok((result, from_cache)) => {
                self.emit(ProgressEvent::FileComplete {
                    file_id: file_id.to_string(),
                    from_cache,
                });
                FileOutcome {
                    file_id: file_id.to_string(),
                    scope: scope.to_string(),
                    result: Some(result),
                    error: None,
                    from_cache,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(file = file_id, scope, error = %message, "file processing failed");
                self.emit(ProgressEvent::Error {
                    file_id: file_id.to_string(),
                    message: message.clone(),
                });
                FileOutcome {
                    file_id: file_id.to_string(),
                    scope: scope.to_string(),
                    result: None,
                    error: Some(message),
                    from_cache: false,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    async fn process_inner(
        &self,
        scope: &str,
        file_id: &str,
        types: &BTreeSet<AnalysisType>,
    ) -> Result<(crate::types::AnalysisResult, bool), ApiError> {
        // Metadata tier: refetch when absent or past its own TTL.
        let record = match self.cache.get_metadata(scope, file_id).await {
            Some(record) => record,
            None => {
                self.emit(ProgressEvent::MetadataFetch {
                    file_id: file_id.to_string(),
                });
                let client = self.pool.client_for(scope)?;
                let record = self
                    .gateway
                    .call("get_file", || client.get_file(scope, file_id))
                    .await?;
                self.cache.set_metadata(scope, file_id, &record).await;
                record
            }
        };

        // Analysis tier: a fresh hit short-circuits straight to done.
        if let Some(cached) = self
            .cache
            .get_analysis(scope, file_id, types, record.modified_at)
            .await
        {
            return Ok((cached, true));
        }

        self.emit(ProgressEvent::AnalysisStart {
            file_id: file_id.to_string(),
        });
        let result = self.orchestrator.analyze(scope, &record, types).await;
        self.emit(ProgressEvent::AnalysisComplete {
            file_id: file_id.to_string(),
            risk: result.risk,
        });

        self.cache
            .set_analysis(scope, file_id, types, &result, record.modified_at)
            .await;

        Ok((result, false))
    }

    /// Process many files in fixed-size windows.
    ///
    /// Files inside a window are dispatched concurrently; the window settles
    /// as a whole before the next one starts (the sole hard ordering
    /// guarantee, bounding concurrent external-call pressure). Outcome
    /// positions match dispatch order regardless of completion order.
    pub async fn process_files(
        &self,
        scope: &str,
        file_ids: &[String],
        types: &BTreeSet<AnalysisType>,
    ) -> Vec<FileOutcome> {
        let mut outcomes = Vec::with_capacity(file_ids.len());
        let windows: Vec<&[String]> = file_ids.chunks(self.config.batch_size.max(1)).collect();
        let window_count = windows.len();

        for (batch_index, window) in windows.into_iter().enumerate() {
            self.emit(ProgressEvent::BatchStart {
                batch_index,
                size: window.len(),
            });

            let window_outcomes = join_all(
                window
                    .iter()
                    .map(|file_id| self.process_file(scope, file_id, types)),
            )
            .await;
            outcomes.extend(window_outcomes);

            self.emit(ProgressEvent::BatchComplete { batch_index });

            if batch_index + 1 < window_count {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }
        }

        outcomes
    }

    /// Inventory and analyse a user's whole estate: drain the paginated
    /// listing, seed the metadata cache with the listed records, process
    /// every file and fold the per-user aggregate.
    pub async fn process_user(
        &self,
        scope: &str,
        types: &BTreeSet<AnalysisType>,
    ) -> Result<UserRunReport, ApiError> {
        let run_id = Uuid::new_v4();
        let records = self.list_all_files(scope).await?;
        info!(scope, run = %run_id, files = records.len(), "starting user run");

        for record in &records {
            self.cache.set_metadata(scope, &record.id, record).await;
        }

        let file_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let outcomes = self.process_files(scope, &file_ids, types).await;
        let aggregate = UserAggregate::fold(scope, &outcomes);

        info!(
            scope,
            run = %run_id,
            total = aggregate.total_files,
            cache_hits = aggregate.cache_hits,
            errors = aggregate.errors,
            "user run complete"
        );

        Ok(UserRunReport {
            run_id,
            scope: scope.to_string(),
            outcomes,
            aggregate,
        })
    }

    /// Drain every page of the user's file listing through the gateway.
    pub async fn list_all_files(&self, scope: &str) -> Result<Vec<FileRecord>, ApiError> {
        let client = self.pool.client_for(scope)?;
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = page_token.clone();
            let page = self
                .gateway
                .call("list_files", || client.list_files(scope, token.as_deref()))
                .await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(files)
    }
}

//! Analysis orchestrator.
//!
//! Fans one file out into the requested sub-analysers, runs them
//! concurrently, captures each outcome independently (one failure never
//! cancels its siblings), and folds the partial results into a single
//! weighted risk tier.

pub mod links;
pub mod location;
pub mod migration;
pub mod sharing;

use crate::config::Config;
use crate::drive::ClientPool;
use crate::gateway::Gateway;
use crate::types::{
    AnalysisError, AnalysisResult, AnalysisType, FileRecord, LocationCategory, RiskTier,
    SharingClass,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Runs the requested subset of sub-analysers for one file.
pub struct Orchestrator {
    pool: Arc<ClientPool>,
    gateway: Arc<Gateway>,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(pool: Arc<ClientPool>, gateway: Arc<Gateway>, config: Arc<Config>) -> Self {
        Self {
            pool,
            gateway,
            config,
        }
    }

    /// Analyse one file.
    ///
    /// For every requested type the result carries either a sub-report or a
    /// recorded error, never both absent. If the authenticated client cannot
    /// be constructed at all, the result carries a single orchestration-level
    /// error and no sub-results.
    pub async fn analyze(
        &self,
        scope: &str,
        record: &FileRecord,
        types: &BTreeSet<AnalysisType>,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::empty(record);

        let client = match self.pool.client_for(scope) {
            Ok(client) => client,
            Err(e) => {
                result.errors.push(AnalysisError {
                    analysis: None,
                    message: format!("could not build authenticated client: {e}"),
                });
                result.risk = score_risk(&result);
                return result;
            }
        };

        // Fan out concurrently; the pure analysers cost nothing to await.
        let links_fut = async {
            if types.contains(&AnalysisType::Links) {
                Some(
                    links::extract_links(record, &client, &self.gateway, &self.config, scope)
                        .await,
                )
            } else {
                None
            }
        };
        let location_fut = async {
            if types.contains(&AnalysisType::Location) {
                Some(
                    location::analyze_location(
                        record,
                        &client,
                        &self.gateway,
                        &self.config.primary_domain,
                        scope,
                    )
                    .await,
                )
            } else {
                None
            }
        };
        let sharing_fut = async {
            types
                .contains(&AnalysisType::Sharing)
                .then(|| sharing::analyze_sharing(record, &self.config.primary_domain))
        };
        let migration_fut = async {
            types
                .contains(&AnalysisType::Migration)
                .then(|| migration::analyze_migration(record))
        };

        let (links_out, location_out, sharing_out, migration_out) =
            tokio::join!(links_fut, location_fut, sharing_fut, migration_fut);

        match links_out {
            Some(Ok(report)) => result.links = Some(report),
            Some(Err(e)) => result.errors.push(AnalysisError {
                analysis: Some(AnalysisType::Links),
                message: e.to_string(),
            }),
            None => {}
        }
        match location_out {
            Some(Ok(report)) => result.location = Some(report),
            Some(Err(e)) => result.errors.push(AnalysisError {
                analysis: Some(AnalysisType::Location),
                message: e.to_string(),
            }),
            None => {}
        }
        result.sharing = sharing_out;
        result.migration = migration_out;

        result.risk = score_risk(&result);
        debug!(
            file = %record.id,
            risk = %result.risk,
            errors = result.errors.len(),
            "analysis complete"
        );
        result
    }
}

// Weights of the aggregate scoring.
const POINTS_PUBLIC: u32 = 3;
const POINTS_EXTERNAL: u32 = 2;
const POINTS_MIGRATION_HIGH: u32 = 3;
const POINTS_MIGRATION_MEDIUM: u32 = 2;
const POINTS_MIGRATION_LOW: u32 = 1;
const POINTS_MANY_FINDINGS: u32 = 1;
const POINTS_EXTERNAL_LINKS: u32 = 1;
const POINTS_MANY_LINKS: u32 = 1;
const POINTS_PARENTLESS: u32 = 2;
const POINTS_ANY_ERROR: u32 = 1;

const MANY_FINDINGS_THRESHOLD: usize = 5;
const MANY_LINKS_THRESHOLD: usize = 20;

const HIGH_THRESHOLD: u32 = 6;
const MEDIUM_THRESHOLD: u32 = 3;

/// Deterministic, total scoring over whatever sub-results are present.
/// Same inputs always produce the same tier.
pub fn score_risk(result: &AnalysisResult) -> RiskTier {
    let mut points = 0u32;

    if let Some(sharing) = &result.sharing {
        if sharing.classification == SharingClass::Public {
            points += POINTS_PUBLIC;
        }
        if !sharing.external_shares.is_empty() {
            points += POINTS_EXTERNAL;
        }
    }

    if let Some(migration) = &result.migration {
        points += match migration.complexity {
            RiskTier::High => POINTS_MIGRATION_HIGH,
            RiskTier::Medium => POINTS_MIGRATION_MEDIUM,
            RiskTier::Low => POINTS_MIGRATION_LOW,
        };
        if migration.findings.len() > MANY_FINDINGS_THRESHOLD {
            points += POINTS_MANY_FINDINGS;
        }
    }

    if let Some(links) = &result.links {
        if links.has_external_links() {
            points += POINTS_EXTERNAL_LINKS;
        }
        if links.total() > MANY_LINKS_THRESHOLD {
            points += POINTS_MANY_LINKS;
        }
    }

    if let Some(location) = &result.location {
        // Both parentless states count: cross-tenant-share is the orphan
        // condition with a foreign owner.
        if matches!(
            location.category,
            LocationCategory::Orphaned | LocationCategory::CrossTenantShare
        ) {
            points += POINTS_PARENTLESS;
        }
    }

    if !result.errors.is_empty() {
        points += POINTS_ANY_ERROR;
    }

    if points >= HIGH_THRESHOLD {
        RiskTier::High
    } else if points >= MEDIUM_THRESHOLD {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::mock::MockDriveClient;
    use crate::drive::{ClientFactory, DriveClient};
    use crate::error::ApiError;
    use crate::types::{
        ContentType, ExtractedLink, LinkReport, LinkTarget, LocationReport, Permission,
        PermissionSubject, SharingReport,
    };
    use chrono::Utc;

    fn record(id: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            name: id.to_string(),
            content_type: ContentType::Spreadsheet,
            mime_type: String::new(),
            owners: vec![],
            parents: vec!["p1".to_string()],
            modified_at: Utc::now(),
            size: 0,
            shared: false,
            permissions: vec![],
            drive_id: None,
        }
    }

    fn orchestrator_with(mock: Arc<MockDriveClient>) -> Orchestrator {
        let client: Arc<dyn DriveClient> = mock;
        Orchestrator::new(
            Arc::new(ClientPool::shared(client)),
            Arc::new(Gateway::unmonitored()),
            Arc::new(Config::for_domain("acme.com")),
        )
    }

    fn all_types() -> BTreeSet<AnalysisType> {
        AnalysisType::ALL.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_every_requested_type_has_report_or_error() {
        let mock = Arc::new(MockDriveClient::new());
        let mut rec = record("f1");
        rec.parents.clear(); // no ancestor lookups needed
        mock.insert(rec.clone());
        let orchestrator = orchestrator_with(mock);

        let result = orchestrator.analyze("user", &rec, &all_types()).await;

        assert!(result.links.is_some());
        assert!(result.sharing.is_some());
        assert!(result.migration.is_some());
        assert!(result.location.is_some());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unrequested_types_absent() {
        let mock = Arc::new(MockDriveClient::new());
        let rec = record("f1");
        let orchestrator = orchestrator_with(mock);
        let types: BTreeSet<AnalysisType> = [AnalysisType::Sharing].into_iter().collect();

        let result = orchestrator.analyze("user", &rec, &types).await;

        assert!(result.sharing.is_some());
        assert!(result.links.is_none());
        assert!(result.migration.is_none());
        assert!(result.location.is_none());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_cancel_siblings() {
        // Permanent failure on the content fetch: links errors, the pure
        // analysers still report.
        struct FailingContent(MockDriveClient);

        #[async_trait::async_trait]
        impl DriveClient for FailingContent {
            async fn list_files(
                &self,
                scope: &str,
                token: Option<&str>,
            ) -> Result<crate::types::FilePage, ApiError> {
                self.0.list_files(scope, token).await
            }
            async fn get_file(&self, scope: &str, id: &str) -> Result<FileRecord, ApiError> {
                self.0.get_file(scope, id).await
            }
            async fn list_permissions(
                &self,
                scope: &str,
                id: &str,
            ) -> Result<Vec<Permission>, ApiError> {
                self.0.list_permissions(scope, id).await
            }
            async fn fetch_document(
                &self,
                _: &str,
                _: &str,
            ) -> Result<crate::drive::DocumentBody, ApiError> {
                Err(ApiError::from_status(403, "no content access"))
            }
            async fn fetch_spreadsheet(
                &self,
                _: &str,
                _: &str,
            ) -> Result<crate::drive::SpreadsheetGrid, ApiError> {
                Err(ApiError::from_status(403, "no content access"))
            }
            async fn fetch_presentation(
                &self,
                _: &str,
                _: &str,
            ) -> Result<crate::drive::PresentationDeck, ApiError> {
                Err(ApiError::from_status(403, "no content access"))
            }
            async fn list_drive_members(
                &self,
                scope: &str,
                id: &str,
            ) -> Result<Vec<Permission>, ApiError> {
                self.0.list_drive_members(scope, id).await
            }
        }

        let client: Arc<dyn DriveClient> = Arc::new(FailingContent(MockDriveClient::new()));
        let orchestrator = Orchestrator::new(
            Arc::new(ClientPool::shared(client)),
            Arc::new(Gateway::unmonitored()),
            Arc::new(Config::for_domain("acme.com")),
        );

        let mut rec = record("f1");
        rec.parents.clear();
        let result = orchestrator.analyze("user", &rec, &all_types()).await;

        assert!(result.links.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].analysis, Some(AnalysisType::Links));
        // Siblings unaffected.
        assert!(result.sharing.is_some());
        assert!(result.migration.is_some());
        assert!(result.location.is_some());
    }

    #[tokio::test]
    async fn test_client_build_failure_yields_orchestration_error() {
        struct BrokenFactory;
        impl ClientFactory for BrokenFactory {
            fn build(&self, _: &str) -> Result<Arc<dyn DriveClient>, ApiError> {
                Err(ApiError::from_status(401, "token expired"))
            }
        }

        let orchestrator = Orchestrator::new(
            Arc::new(ClientPool::new(Arc::new(BrokenFactory))),
            Arc::new(Gateway::unmonitored()),
            Arc::new(Config::for_domain("acme.com")),
        );

        let rec = record("f1");
        let result = orchestrator.analyze("user", &rec, &all_types()).await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].analysis.is_none());
        assert!(result.links.is_none());
        assert!(result.sharing.is_none());
    }

    fn base_result() -> AnalysisResult {
        AnalysisResult::empty(&record("f1"))
    }

    #[test]
    fn test_score_public_external_migration_is_high() {
        let mut result = base_result();
        result.sharing = Some(SharingReport {
            classification: SharingClass::Public,
            external_shares: vec![],
            share_count: 1,
            risk: RiskTier::High,
        });
        result.migration = Some(crate::types::MigrationReport {
            findings: vec![],
            complexity: RiskTier::High,
            recommendations: vec![],
        });
        // 3 (public) + 3 (high complexity) = 6
        assert_eq!(score_risk(&result), RiskTier::High);
    }

    #[test]
    fn test_score_orphan_plus_error_is_medium() {
        let mut result = base_result();
        result.location = Some(LocationReport {
            category: LocationCategory::Orphaned,
            folder_path: vec![],
            path_truncated: false,
        });
        result.errors.push(AnalysisError {
            analysis: Some(AnalysisType::Links),
            message: "boom".to_string(),
        });
        // 2 + 1 = 3
        assert_eq!(score_risk(&result), RiskTier::Medium);
    }

    #[test]
    fn test_score_many_links_only_is_low() {
        let mut result = base_result();
        let links = (0..25)
            .map(|i| ExtractedLink {
                url: format!("https://ext.com/{i}"),
                target: LinkTarget::External,
            })
            .collect();
        result.links = Some(LinkReport {
            links,
            incompatible_functions: vec![],
            migration_flag: false,
        });
        // 1 (external) + 1 (>20 links) = 2
        assert_eq!(score_risk(&result), RiskTier::Low);
    }

    #[test]
    fn test_score_is_deterministic() {
        let mut result = base_result();
        result.location = Some(LocationReport {
            category: LocationCategory::CrossTenantShare,
            folder_path: vec![],
            path_truncated: false,
        });
        assert_eq!(score_risk(&result), score_risk(&result));
    }
}

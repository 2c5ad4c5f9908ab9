//! Drive graph walker.
//!
//! Walks a whole estate (personal or shared drive), classifies every file by
//! its position in the folder graph, and scores shared-drive exposure. The
//! expensive part, deciding whether any ancestor folder is foreign-owned, is
//! done against a cross-tenant folder set precomputed once per walk; parents
//! outside the listing are resolved on demand and memoized into that set.

use crate::config::Config;
use crate::drive::{ClientPool, DriveClient};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::types::{same_domain, FileRecord, PermissionSubject, RiskTier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ancestor chains longer than this are treated as a dead end.
const MAX_ANCESTOR_DEPTH: usize = 40;

/// Where a file sits in the folder graph, relative to the caller's tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileClassification {
    /// Parented, with no foreign-owned ancestor.
    Normal,
    /// No parents, owned inside the caller's domain.
    Orphaned,
    /// No parents, owned by a foreign domain. Ownership mismatch takes
    /// priority over parentlessness as the explanatory reason.
    CrossTenantShare,
    /// Parented under a folder owned by a foreign domain, whatever the
    /// file's own ownership.
    InCrossTenantFolder,
}

/// One file's classification within a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedFile {
    pub file_id: String,
    pub name: String,
    pub classification: FileClassification,
}

/// Per-drive aggregate over a full walk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveAggregate {
    pub total_files: usize,
    pub normal: usize,
    pub orphaned: usize,
    pub cross_tenant_shares: usize,
    pub in_cross_tenant_folders: usize,
    pub risk: RiskTier,
}

/// Output of [`DriveWalker::walk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveWalkReport {
    pub scope: String,
    pub files: Vec<ClassifiedFile>,
    pub aggregate: DriveAggregate,
}

/// Shared-drive membership and exposure summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDriveReport {
    pub drive_id: String,
    pub member_count: usize,
    /// External members bucketed by their domain.
    pub external_members_by_domain: BTreeMap<String, usize>,
    /// Permissions on individual files reaching outside the primary domain.
    pub external_file_shares: usize,
    /// Files carrying an anyone-with-the-link permission.
    pub public_files: usize,
    pub risk: RiskTier,
}

/// Classifies an estate's files against the folder graph.
pub struct DriveWalker {
    pool: Arc<ClientPool>,
    gateway: Arc<Gateway>,
    config: Arc<Config>,
}

/// Walk-local ancestor state: the cross-tenant folder set plus a memo of
/// every parent resolved on demand (`None` = inaccessible, a dead end).
struct AncestorIndex {
    cross_tenant: HashSet<String>,
    resolved: HashMap<String, Option<FileRecord>>,
}

impl AncestorIndex {
    /// Seed from the listing: every foreign-owned folder goes into the set,
    /// every listed folder is considered resolved.
    fn seed(files: &[FileRecord], primary_domain: &str) -> Self {
        let mut cross_tenant = HashSet::new();
        let mut resolved = HashMap::new();
        for file in files.iter().filter(|f| f.content_type.is_folder()) {
            if is_foreign(file, primary_domain) {
                cross_tenant.insert(file.id.clone());
            }
            resolved.insert(file.id.clone(), Some(file.clone()));
        }
        Self {
            cross_tenant,
            resolved,
        }
    }
}

fn is_foreign(record: &FileRecord, primary_domain: &str) -> bool {
    match record.owner_domain() {
        Some(domain) => !same_domain(domain, primary_domain),
        None => false,
    }
}

impl DriveWalker {
    pub fn new(pool: Arc<ClientPool>, gateway: Arc<Gateway>, config: Arc<Config>) -> Self {
        Self {
            pool,
            gateway,
            config,
        }
    }

    /// Walk the scope's whole listing and classify every file.
    pub async fn walk(&self, scope: &str) -> Result<DriveWalkReport, ApiError> {
        let client = self.pool.client_for(scope)?;
        let records = self.drain_listing(scope, &client).await?;
        info!(scope, files = records.len(), "walking drive graph");

        let mut index = AncestorIndex::seed(&records, &self.config.primary_domain);
        let mut files = Vec::with_capacity(records.len());
        let mut aggregate = DriveAggregate::default();

        for record in &records {
            let classification = self
                .classify(scope, &client, record, &mut index)
                .await;
            aggregate.total_files += 1;
            match classification {
                FileClassification::Normal => aggregate.normal += 1,
                FileClassification::Orphaned => aggregate.orphaned += 1,
                FileClassification::CrossTenantShare => aggregate.cross_tenant_shares += 1,
                FileClassification::InCrossTenantFolder => {
                    aggregate.in_cross_tenant_folders += 1
                }
            }
            files.push(ClassifiedFile {
                file_id: record.id.clone(),
                name: record.name.clone(),
                classification,
            });
        }

        aggregate.risk = walk_risk(&aggregate);

        Ok(DriveWalkReport {
            scope: scope.to_string(),
            files,
            aggregate,
        })
    }

    /// Classify one file. The cross-tenant-folder check runs first for
    /// parented files; only parentless files can be orphans.
    async fn classify(
        &self,
        scope: &str,
        client: &Arc<dyn DriveClient>,
        record: &FileRecord,
        index: &mut AncestorIndex,
    ) -> FileClassification {
        if record.parents.is_empty() {
            return if is_foreign(record, &self.config.primary_domain) {
                FileClassification::CrossTenantShare
            } else {
                FileClassification::Orphaned
            };
        }

        if self
            .has_cross_tenant_ancestor(scope, client, record, index)
            .await
        {
            FileClassification::InCrossTenantFolder
        } else {
            FileClassification::Normal
        }
    }

    /// Iterative ancestor walk. Direct set membership is checked before any
    /// resolution; previously unseen parents are fetched once, memoized, and
    /// fed back into the set when foreign. A resolution failure or a chain
    /// past the depth bound is a dead end, not an error.
    async fn has_cross_tenant_ancestor(
        &self,
        scope: &str,
        client: &Arc<dyn DriveClient>,
        record: &FileRecord,
        index: &mut AncestorIndex,
    ) -> bool {
        // Depth is tracked per chain: a wide frontier of shallow parents
        // must not exhaust the bound meant for long vertical chains.
        let mut pending: Vec<(String, usize)> =
            record.parents.iter().map(|p| (p.clone(), 1)).collect();
        let mut visited: HashSet<String> = HashSet::new();

        while let Some((parent_id, depth)) = pending.pop() {
            if !visited.insert(parent_id.clone()) {
                continue;
            }
            if depth > MAX_ANCESTOR_DEPTH {
                debug!(file = record.id, "ancestor chain exceeds depth bound");
                continue;
            }

            if index.cross_tenant.contains(&parent_id) {
                return true;
            }

            let resolved = match index.resolved.get(&parent_id) {
                Some(memo) => memo.clone(),
                None => {
                    let fetched = self
                        .gateway
                        .call("resolve_parent", || client.get_file(scope, &parent_id))
                        .await;
                    let memo = match fetched {
                        Ok(parent) => Some(parent),
                        Err(e) => {
                            warn!(parent = parent_id, error = %e, "parent unresolvable, dead end");
                            None
                        }
                    };
                    index.resolved.insert(parent_id.clone(), memo.clone());
                    memo
                }
            };

            let Some(parent) = resolved else { continue };
            if is_foreign(&parent, &self.config.primary_domain) {
                index.cross_tenant.insert(parent.id.clone());
                return true;
            }
            pending.extend(parent.parents.iter().map(|p| (p.clone(), depth + 1)));
        }

        false
    }

    /// Membership and exposure of one shared drive.
    ///
    /// `files` is the drive's file listing, typically the records of a prior
    /// [`walk`](Self::walk) filtered to this drive.
    pub async fn analyze_shared_drive(
        &self,
        scope: &str,
        drive_id: &str,
        files: &[FileRecord],
    ) -> Result<SharedDriveReport, ApiError> {
        let client = self.pool.client_for(scope)?;
        let members = self
            .gateway
            .call("list_drive_members", || {
                client.list_drive_members(scope, drive_id)
            })
            .await?;

        let mut external_members_by_domain: BTreeMap<String, usize> = BTreeMap::new();
        for member in &members {
            if let Some(domain) = member.effective_domain() {
                if !same_domain(domain, &self.config.primary_domain) {
                    *external_members_by_domain
                        .entry(domain.to_ascii_lowercase())
                        .or_default() += 1;
                }
            }
        }

        let mut external_file_shares = 0;
        let mut public_files = 0;
        for file in files {
            let mut is_public = false;
            for permission in &file.permissions {
                match permission.subject {
                    PermissionSubject::Anyone => is_public = true,
                    _ => {
                        if let Some(domain) = permission.effective_domain() {
                            if !same_domain(domain, &self.config.primary_domain) {
                                external_file_shares += 1;
                            }
                        }
                    }
                }
            }
            if is_public {
                public_files += 1;
            }
        }

        let external_member_count: usize = external_members_by_domain.values().sum();
        let risk = drive_risk(public_files, external_member_count, external_file_shares);

        Ok(SharedDriveReport {
            drive_id: drive_id.to_string(),
            member_count: members.len(),
            external_members_by_domain,
            external_file_shares,
            public_files,
            risk,
        })
    }

    async fn drain_listing(
        &self,
        scope: &str,
        client: &Arc<dyn DriveClient>,
    ) -> Result<Vec<FileRecord>, ApiError> {
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

/// First match wins: public presence dominates, member and share counts are
/// secondary.
fn drive_risk(public_files: usize, external_members: usize, external_shares: usize) -> RiskTier {
    if public_files > 0 {
        RiskTier::High
    } else if external_members > 5 || external_shares > 10 {
        RiskTier::High
    } else if external_members > 0 || external_shares > 0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

fn walk_risk(aggregate: &DriveAggregate) -> RiskTier {
    let cross_tenant = aggregate.cross_tenant_shares + aggregate.in_cross_tenant_folders;
    if cross_tenant > 10 {
        RiskTier::High
    } else if cross_tenant > 0 || aggregate.orphaned > 5 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::mock::MockDriveClient;
    use crate::types::{ContentType, Owner, Permission};
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    fn walker(mock: Arc<MockDriveClient>) -> DriveWalker {
        let client: Arc<dyn DriveClient> = mock;
        DriveWalker::new(
            Arc::new(ClientPool::shared(client)),
            Arc::new(Gateway::unmonitored()),
            Arc::new(Config::for_domain("acme.com")),
        )
    }

    fn record(id: &str, owner_domain: &str, parents: &[&str]) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            name: id.to_string(),
            content_type: ContentType::Document,
            mime_type: "application/vnd.google-apps.document".to_string(),
            owners: vec![Owner {
                email: None,
                domain: Some(owner_domain.to_string()),
                display_name: None,
            }],
            parents: parents.iter().map(|p| p.to_string()).collect(),
            modified_at: Utc::now(),
            size: 0,
            shared: false,
            permissions: vec![],
            drive_id: None,
        }
    }

    fn folder(id: &str, owner_domain: &str, parents: &[&str]) -> FileRecord {
        let mut f = record(id, owner_domain, parents);
        f.content_type = ContentType::Folder;
        f.mime_type = "application/vnd.google-apps.folder".to_string();
        f
    }

    fn classification_of(report: &DriveWalkReport, id: &str) -> FileClassification {
        report
            .files
            .iter()
            .find(|f| f.file_id == id)
            .unwrap()
            .classification
    }

    #[tokio::test]
    async fn test_parentless_file_owner_decides_orphan_vs_cross_tenant() {
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(record("own", "acme.com", &[]));
        mock.insert(record("f1", "ext.com", &[]));

        let report = walker(mock).walk("user").await.unwrap();

        assert_eq!(
            classification_of(&report, "own"),
            FileClassification::Orphaned
        );
        assert_eq!(
            classification_of(&report, "f1"),
            FileClassification::CrossTenantShare
        );
        assert_eq!(report.aggregate.orphaned, 1);
        assert_eq!(report.aggregate.cross_tenant_shares, 1);
    }

    #[tokio::test]
    async fn test_foreign_parent_classifies_file_even_with_local_owner() {
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(folder("ext-folder", "partner.org", &[]));
        mock.insert(record("doc", "acme.com", &["ext-folder"]));

        let report = walker(mock).walk("user").await.unwrap();

        assert_eq!(
            classification_of(&report, "doc"),
            FileClassification::InCrossTenantFolder
        );
    }

    #[tokio::test]
    async fn test_listed_folders_need_no_resolution() {
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(folder("local", "acme.com", &[]));
        mock.insert(record("a", "acme.com", &["local"]));
        mock.insert(record("b", "acme.com", &["local"]));

        let w = walker(mock.clone());
        let report = w.walk("user").await.unwrap();

        assert_eq!(classification_of(&report, "a"), FileClassification::Normal);
        assert_eq!(classification_of(&report, "b"), FileClassification::Normal);
        // Everything needed was in the listing.
        assert_eq!(mock.get_file_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_foreign_grandparent_found_through_chain() {
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(folder("top", "partner.org", &[]));
        mock.insert(folder("mid", "acme.com", &["top"]));
        mock.insert(record("a", "acme.com", &["mid"]));
        mock.insert(record("b", "acme.com", &["mid"]));

        let w = walker(mock.clone());
        let report = w.walk("user").await.unwrap();

        assert_eq!(
            classification_of(&report, "a"),
            FileClassification::InCrossTenantFolder
        );
        assert_eq!(
            classification_of(&report, "b"),
            FileClassification::InCrossTenantFolder
        );
        // Both chains were answered from the seeded listing.
        assert_eq!(mock.get_file_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wide_parent_frontier_does_not_exhaust_depth_bound() {
        // 60 shallow local parents; only the one examined last leads to a
        // foreign grandparent. The bound limits chain depth, not frontier
        // width, so the foreign ancestor must still be found.
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(folder("top", "partner.org", &[]));
        mock.insert(folder("p00", "acme.com", &["top"]));
        let parent_ids: Vec<String> = (0..60).map(|i| format!("p{i:02}")).collect();
        for id in parent_ids.iter().skip(1) {
            mock.insert(folder(id, "acme.com", &[]));
        }
        let parent_refs: Vec<&str> = parent_ids.iter().map(|s| s.as_str()).collect();
        mock.insert(record("doc", "acme.com", &parent_refs));

        let report = walker(mock).walk("user").await.unwrap();

        assert_eq!(
            classification_of(&report, "doc"),
            FileClassification::InCrossTenantFolder
        );
    }

    #[tokio::test]
    async fn test_unresolvable_parent_is_a_dead_end_not_an_error() {
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(record("doc", "acme.com", &["gone"]));
        mock.fail_file("gone", ApiError::from_status(403, "no access"));

        let report = walker(mock).walk("user").await.unwrap();

        assert_eq!(
            classification_of(&report, "doc"),
            FileClassification::Normal
        );
    }

    #[tokio::test]
    async fn test_cyclic_parent_chain_terminates() {
        let mock = Arc::new(MockDriveClient::new());
        mock.insert(folder("a", "acme.com", &["b"]));
        mock.insert(folder("b", "acme.com", &["a"]));
        mock.insert(record("doc", "acme.com", &["a"]));

        let report = walker(mock).walk("user").await.unwrap();

        assert_eq!(
            classification_of(&report, "doc"),
            FileClassification::Normal
        );
    }

    #[tokio::test]
    async fn test_shared_drive_risk_tiers() {
        let mock = Arc::new(MockDriveClient::new());
        let member = |domain: &str| Permission {
            subject: PermissionSubject::Individual,
            role: "reader".to_string(),
            email: Some(format!("a@{domain}")),
            domain: None,
        };
        mock.drive_members
            .lock()
            .unwrap()
            .insert("d1".to_string(), vec![member("acme.com"), member("ext.com")]);

        let mut public_file = record("p", "acme.com", &[]);
        public_file.permissions = vec![Permission {
            subject: PermissionSubject::Anyone,
            role: "reader".to_string(),
            email: None,
            domain: None,
        }];

        let w = walker(mock);

        // Public file dominates.
        let report = w
            .analyze_shared_drive("user", "d1", std::slice::from_ref(&public_file))
            .await
            .unwrap();
        assert_eq!(report.risk, RiskTier::High);
        assert_eq!(report.public_files, 1);
        assert_eq!(report.member_count, 2);
        assert_eq!(report.external_members_by_domain.get("ext.com"), Some(&1));

        // One external member, no public files.
        let report = w.analyze_shared_drive("user", "d1", &[]).await.unwrap();
        assert_eq!(report.risk, RiskTier::Medium);
        assert_eq!(report.external_file_shares, 0);
    }

    #[tokio::test]
    async fn test_external_file_shares_counted_per_permission() {
        let mock = Arc::new(MockDriveClient::new());
        mock.drive_members
            .lock()
            .unwrap()
            .insert("d1".to_string(), vec![]);

        let mut file = record("f", "acme.com", &[]);
        file.permissions = vec![
            Permission {
                subject: PermissionSubject::Individual,
                role: "writer".to_string(),
                email: Some("x@ext.com".to_string()),
                domain: None,
            },
            Permission {
                subject: PermissionSubject::Individual,
                role: "reader".to_string(),
                email: Some("y@acme.com".to_string()),
                domain: None,
            },
        ];

        let report = walker(mock)
            .analyze_shared_drive("user", "d1", std::slice::from_ref(&file))
            .await
            .unwrap();

        assert_eq!(report.external_file_shares, 1);
        assert_eq!(report.risk, RiskTier::Medium);
    }
}

//! Shared types for the drive analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Content type of a drive item, derived from the vendor MIME tag.
///
/// Matched exhaustively everywhere a handler is selected, so a new content
/// type is a compile-time-visible gap rather than a silently skipped branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Document,
    Spreadsheet,
    Presentation,
    Folder,
    Other,
}

impl ContentType {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "application/vnd.google-apps.document" => Self::Document,
            "application/vnd.google-apps.spreadsheet" => Self::Spreadsheet,
            "application/vnd.google-apps.presentation" => Self::Presentation,
            "application/vnd.google-apps.folder" => Self::Folder,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Folder => "folder",
            Self::Other => "other",
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owner identity attached to a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub email: Option<String>,
    pub domain: Option<String>,
    pub display_name: Option<String>,
}

impl Owner {
    /// Owner domain, falling back to the email's domain part.
    pub fn effective_domain(&self) -> Option<&str> {
        self.domain
            .as_deref()
            .or_else(|| self.email.as_deref().and_then(email_domain))
    }
}

/// Split the domain out of an email address.
pub fn email_domain(email: &str) -> Option<&str> {
    email.rsplit_once('@').map(|(_, d)| d)
}

/// DNS domains compare case-insensitively; every tenant-boundary check goes
/// through here so a case variant never flips a classification.
pub fn same_domain(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Who a permission grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSubject {
    /// A single user or group account.
    Individual,
    /// Everyone in one domain.
    Domain,
    /// Anyone with the link.
    Anyone,
}

/// One entry of a file's permission list. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub subject: PermissionSubject,
    pub role: String,
    pub email: Option<String>,
    pub domain: Option<String>,
}

impl Permission {
    /// Domain this permission reaches, from the explicit field or the email.
    pub fn effective_domain(&self) -> Option<&str> {
        self.domain
            .as_deref()
            .or_else(|| self.email.as_deref().and_then(email_domain))
    }
}

/// Metadata record for one drive item.
///
/// Fetched fresh from the vendor API on cache miss or staleness; the cache
/// stores copies, never the authoritative version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub content_type: ContentType,
    pub mime_type: String,
    pub owners: Vec<Owner>,
    /// Zero, one or many parent folder ids. Empty = orphan candidate.
    pub parents: Vec<String>,
    /// Source modification timestamp; doubles as the cache freshness token.
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub shared: bool,
    pub permissions: Vec<Permission>,
    /// Set when the file lives on a shared drive.
    pub drive_id: Option<String>,
}

impl FileRecord {
    /// Domain of the first listed owner, if any.
    pub fn owner_domain(&self) -> Option<&str> {
        self.owners.iter().find_map(|o| o.effective_domain())
    }
}

/// One page of a file listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    pub files: Vec<FileRecord>,
    pub next_page_token: Option<String>,
}

/// The independent sub-analyses a file can be put through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Links,
    Sharing,
    Migration,
    Location,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 4] = [Self::Links, Self::Sharing, Self::Migration, Self::Location];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::Sharing => "sharing",
            Self::Migration => "migration",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived risk tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an extracted link points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LinkTarget {
    /// A drive file we resolved via a metadata lookup.
    DriveFile {
        file_id: String,
        name: Option<String>,
        content_type: Option<ContentType>,
    },
    /// An in-ecosystem document link that did not resolve to a file id.
    Ecosystem,
    /// Anything else, left verbatim.
    External,
}

/// A deduplicated link pulled out of a file's structured content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLink {
    pub url: String,
    #[serde(flatten)]
    pub target: LinkTarget,
}

/// Output of the link-extraction sub-analyser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub links: Vec<ExtractedLink>,
    /// Spreadsheet formula functions that are platform-specific.
    pub incompatible_functions: Vec<String>,
    /// Set when the incompatible-function intersection is non-empty.
    pub migration_flag: bool,
}

impl LinkReport {
    pub fn total(&self) -> usize {
        self.links.len()
    }

    pub fn has_external_links(&self) -> bool {
        self.links
            .iter()
            .any(|l| matches!(l.target, LinkTarget::External))
    }
}

/// Sharing classification of a file's permission list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingClass {
    Private,
    DomainWide,
    Public,
}

/// A permission reaching outside the tenant's primary domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalShare {
    pub email: Option<String>,
    pub domain: String,
    pub role: String,
}

/// Output of the sharing sub-analyser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingReport {
    pub classification: SharingClass,
    pub external_shares: Vec<ExternalShare>,
    pub share_count: usize,
    pub risk: RiskTier,
}

/// Severity of one migration finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Output of the migration sub-analyser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub findings: Vec<MigrationFinding>,
    pub complexity: RiskTier,
    pub recommendations: Vec<String>,
}

/// One platform-specific incompatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFinding {
    pub kind: String,
    pub severity: Severity,
    pub detail: String,
}

/// Location classification of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationCategory {
    SharedDrive,
    PersonalDrive,
    /// No parents, owner inside the tenant domain.
    Orphaned,
    /// No parents, owner outside the tenant domain.
    CrossTenantShare,
}

/// Output of the location sub-analyser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReport {
    pub category: LocationCategory,
    /// Ancestor folder names, outermost first, "My Drive" root skipped.
    pub folder_path: Vec<String>,
    /// True when an inaccessible ancestor cut the path short.
    pub path_truncated: bool,
}

/// Error recorded for one sub-analysis (or for orchestration itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisError {
    /// None = the orchestrator could not run at all.
    pub analysis: Option<AnalysisType>,
    pub message: String,
}

/// Aggregated per-file analysis output.
///
/// Invariant: for every requested analysis type there is either a sub-report
/// or a recorded [`AnalysisError`], never both absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub file_id: String,
    pub file_name: String,
    pub content_type: ContentType,
    pub links: Option<LinkReport>,
    pub sharing: Option<SharingReport>,
    pub migration: Option<MigrationReport>,
    pub location: Option<LocationReport>,
    pub risk: RiskTier,
    pub errors: Vec<AnalysisError>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn empty(record: &FileRecord) -> Self {
        Self {
            file_id: record.id.clone(),
            file_name: record.name.clone(),
            content_type: record.content_type,
            links: None,
            sharing: None,
            migration: None,
            location: None,
            risk: RiskTier::Low,
            errors: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }
}

/// Terminal outcome of processing one file through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub file_id: String,
    /// User scope the file was processed under.
    pub scope: String,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub from_cache: bool,
    pub elapsed_ms: u64,
}

impl FileOutcome {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Per-user aggregate folded over many [`FileOutcome`]s.
///
/// The fold is associative and order-independent; batch completion order is
/// not guaranteed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAggregate {
    pub scope: String,
    pub total_files: usize,
    pub by_content_type: BTreeMap<String, usize>,
    pub external_share_count: usize,
    pub risk_low: usize,
    pub risk_medium: usize,
    pub risk_high: usize,
    pub cache_hits: usize,
    pub errors: usize,
}

impl UserAggregate {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Fold one outcome into the aggregate.
    pub fn absorb(&mut self, outcome: &FileOutcome) {
        self.total_files += 1;
        if outcome.from_cache {
            self.cache_hits += 1;
        }
        match &outcome.result {
            Some(result) => {
                *self
                    .by_content_type
                    .entry(result.content_type.as_str().to_string())
                    .or_default() += 1;
                if let Some(sharing) = &result.sharing {
                    self.external_share_count += sharing.external_shares.len();
                }
                match result.risk {
                    RiskTier::Low => self.risk_low += 1,
                    RiskTier::Medium => self.risk_medium += 1,
                    RiskTier::High => self.risk_high += 1,
                }
            }
            None => self.errors += 1,
        }
    }

    /// Combine two aggregates (the associativity that makes the fold safe
    /// under arbitrary batch ordering).
    pub fn merge(&mut self, other: &UserAggregate) {
        self.total_files += other.total_files;
        for (k, v) in &other.by_content_type {
            *self.by_content_type.entry(k.clone()).or_default() += v;
        }
        self.external_share_count += other.external_share_count;
        self.risk_low += other.risk_low;
        self.risk_medium += other.risk_medium;
        self.risk_high += other.risk_high;
        self.cache_hits += other.cache_hits;
        self.errors += other.errors;
    }

    /// Fold a slice of outcomes into a fresh aggregate.
    pub fn fold(scope: impl Into<String>, outcomes: &[FileOutcome]) -> Self {
        let mut agg = Self::new(scope);
        for outcome in outcomes {
            agg.absorb(outcome);
        }
        agg
    }
}

//! Migration-compatibility sub-analyser.
//!
//! Maps each content type to its fixed set of platform-specific
//! incompatibilities, derives an overall complexity tier from the severity
//! counts, and turns the finding kinds into human-readable recommendations.

use crate::types::{ContentType, FileRecord, MigrationFinding, MigrationReport, RiskTier, Severity};

struct FindingSpec {
    kind: &'static str,
    severity: Severity,
    detail: &'static str,
    recommendation: &'static str,
}

const DOCUMENT_FINDINGS: &[FindingSpec] = &[
    FindingSpec {
        kind: "comment_threads",
        severity: Severity::Low,
        detail: "Comment threads and suggestions are not carried over by bulk export",
        recommendation: "Resolve or export open comment threads before migrating documents",
    },
    FindingSpec {
        kind: "smart_chips",
        severity: Severity::Medium,
        detail: "People/file smart chips degrade to plain text outside the platform",
        recommendation: "Replace smart chips with explicit names and links",
    },
];

const SPREADSHEET_FINDINGS: &[FindingSpec] = &[
    FindingSpec {
        kind: "bound_script",
        severity: Severity::High,
        detail: "Container-bound scripts cannot be exported with the spreadsheet",
        recommendation: "Rewrite container-bound scripts on the target platform",
    },
    FindingSpec {
        kind: "platform_functions",
        severity: Severity::Medium,
        detail: "Formulas may use platform-specific functions with no equivalent",
        recommendation: "Audit formulas for platform-specific functions and replace them",
    },
    FindingSpec {
        kind: "linked_forms",
        severity: Severity::Medium,
        detail: "Linked form responses stop syncing after export",
        recommendation: "Snapshot form response sheets before migrating",
    },
];

const PRESENTATION_FINDINGS: &[FindingSpec] = &[
    FindingSpec {
        kind: "embedded_video",
        severity: Severity::Medium,
        detail: "Platform-hosted video embeds break outside the platform",
        recommendation: "Re-link embedded videos to portable sources",
    },
    FindingSpec {
        kind: "linked_charts",
        severity: Severity::Low,
        detail: "Charts linked to spreadsheets freeze at their exported state",
        recommendation: "Refresh linked charts immediately before export",
    },
];

const FOLDER_FINDINGS: &[FindingSpec] = &[FindingSpec {
    kind: "shortcut_children",
    severity: Severity::Low,
    detail: "Shortcuts inside folders export as broken references",
    recommendation: "Replace shortcuts with real copies where content must travel",
}];

/// Findings for one file, determined entirely by its content type.
pub fn analyze_migration(record: &FileRecord) -> MigrationReport {
    let specs: &[FindingSpec] = match record.content_type {
        ContentType::Document => DOCUMENT_FINDINGS,
        ContentType::Spreadsheet => SPREADSHEET_FINDINGS,
        ContentType::Presentation => PRESENTATION_FINDINGS,
        ContentType::Folder => FOLDER_FINDINGS,
        // Opaque binaries move as-is.
        ContentType::Other => &[],
    };

    let findings: Vec<MigrationFinding> = specs
        .iter()
        .map(|s| MigrationFinding {
            kind: s.kind.to_string(),
            severity: s.severity,
            detail: s.detail.to_string(),
        })
        .collect();

    let complexity = complexity_tier(&findings);
    let recommendations = specs.iter().map(|s| s.recommendation.to_string()).collect();

    MigrationReport {
        findings,
        complexity,
        recommendations,
    }
}

/// Overall complexity from severity counts: any high finding dominates, then
/// any medium, else low.
fn complexity_tier(findings: &[MigrationFinding]) -> RiskTier {
    let high = findings.iter().filter(|f| f.severity == Severity::High).count();
    let medium = findings
        .iter()
        .filter(|f| f.severity == Severity::Medium)
        .count();
    if high > 0 {
        RiskTier::High
    } else if medium > 0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(content_type: ContentType) -> FileRecord {
        FileRecord {
            id: "f1".to_string(),
            name: "f1".to_string(),
            content_type,
            mime_type: String::new(),
            owners: vec![],
            parents: vec![],
            modified_at: Utc::now(),
            size: 0,
            shared: false,
            permissions: vec![],
            drive_id: None,
        }
    }

    #[test]
    fn test_spreadsheet_is_high_complexity() {
        let report = analyze_migration(&record(ContentType::Spreadsheet));
        assert_eq!(report.complexity, RiskTier::High);
        assert!(report.findings.iter().any(|f| f.kind == "bound_script"));
        assert_eq!(report.recommendations.len(), report.findings.len());
    }

    #[test]
    fn test_document_is_medium_complexity() {
        let report = analyze_migration(&record(ContentType::Document));
        assert_eq!(report.complexity, RiskTier::Medium);
    }

    #[test]
    fn test_other_has_no_findings() {
        let report = analyze_migration(&record(ContentType::Other));
        assert!(report.findings.is_empty());
        assert_eq!(report.complexity, RiskTier::Low);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let a = analyze_migration(&record(ContentType::Presentation));
        let b = analyze_migration(&record(ContentType::Presentation));
        assert_eq!(a.complexity, b.complexity);
        assert_eq!(a.findings.len(), b.findings.len());
    }
}

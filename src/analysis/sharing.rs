//! Sharing/permission sub-analyser.
//!
//! Pure classification of a file's permission list: public / domain-wide /
//! private, the subset of shares that leave the tenant's primary domain,
//! and a priority-ordered risk tier.

use crate::types::{
    same_domain, ExternalShare, FileRecord, Permission, PermissionSubject, RiskTier,
    SharingClass, SharingReport,
};

// Policy constants for the priority-ordered scoring.
const EXTERNAL_HIGH_THRESHOLD: usize = 5;
const SHARE_COUNT_MEDIUM_THRESHOLD: usize = 10;

/// Classify a file's sharing exposure.
pub fn analyze_sharing(record: &FileRecord, primary_domain: &str) -> SharingReport {
    let classification = classify(&record.permissions, primary_domain);
    let external_shares = external_shares(&record.permissions, primary_domain);
    let share_count = record.permissions.len();
    let risk = sharing_risk(
        classification,
        external_shares.len(),
        share_count,
    );

    SharingReport {
        classification,
        external_shares,
        share_count,
        risk,
    }
}

fn classify(permissions: &[Permission], primary_domain: &str) -> SharingClass {
    if permissions
        .iter()
        .any(|p| p.subject == PermissionSubject::Anyone)
    {
        return SharingClass::Public;
    }
    if permissions.iter().any(|p| {
        p.subject == PermissionSubject::Domain
            && p.effective_domain()
                .is_some_and(|d| same_domain(d, primary_domain))
    }) {
        return SharingClass::DomainWide;
    }
    SharingClass::Private
}

/// Permissions whose reach crosses the tenant boundary.
fn external_shares(permissions: &[Permission], primary_domain: &str) -> Vec<ExternalShare> {
    permissions
        .iter()
        .filter(|p| p.subject != PermissionSubject::Anyone)
        .filter_map(|p| {
            let domain = p.effective_domain()?;
            if same_domain(domain, primary_domain) {
                return None;
            }
            Some(ExternalShare {
                email: p.email.clone(),
                domain: domain.to_string(),
                role: p.role.clone(),
            })
        })
        .collect()
}

/// Priority-ordered, first-match-wins risk tier: public link beats
/// everything, then external-share count, then domain-wide sharing, then raw
/// share count.
fn sharing_risk(
    classification: SharingClass,
    external_count: usize,
    share_count: usize,
) -> RiskTier {
    if classification == SharingClass::Public {
        return RiskTier::High;
    }
    if external_count > EXTERNAL_HIGH_THRESHOLD {
        return RiskTier::High;
    }
    if external_count > 0 {
        return RiskTier::Medium;
    }
    if classification == SharingClass::DomainWide {
        return RiskTier::Medium;
    }
    if share_count > SHARE_COUNT_MEDIUM_THRESHOLD {
        return RiskTier::Medium;
    }
    RiskTier::Low
}

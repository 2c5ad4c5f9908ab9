//! Location/orphan sub-analyser.
//!
//! Classifies a file as shared-drive / personal-drive / orphaned /
//! cross-tenant-share and, for parented files, resolves the ancestor chain
//! into an ordered folder-name path. The walk is iterative with a visited
//! set and a depth bound; an inaccessible ancestor ends the walk with the
//! partial path rather than failing.

use crate::drive::DriveClient;
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::types::{same_domain, FileRecord, LocationCategory, LocationReport};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Ancestor chains deeper than this are treated as cut off. Also the cycle
/// backstop when the visited set is somehow bypassed.
const MAX_ANCESTOR_DEPTH: usize = 40;

/// Synthetic root folder name, skipped from paths.
const MY_DRIVE_ROOT: &str = "My Drive";

/// Classify a file's location and build its folder path.
pub async fn analyze_location(
    record: &FileRecord,
    client: &Arc<dyn DriveClient>,
    gateway: &Gateway,
    primary_domain: &str,
    scope: &str,
) -> Result<LocationReport, ApiError> {
    if record.drive_id.is_some() {
        let (folder_path, path_truncated) =
            build_folder_path(record, client, gateway, scope).await;
        return Ok(LocationReport {
            category: LocationCategory::SharedDrive,
            folder_path,
            path_truncated,
        });
    }

    if record.parents.is_empty() {
        // Ownership mismatch beats parentlessness as the explanation.
        let category = match record.owner_domain() {
            Some(domain) if !same_domain(domain, primary_domain) => {
                LocationCategory::CrossTenantShare
            }
            _ => LocationCategory::Orphaned,
        };
        return Ok(LocationReport {
            category,
            folder_path: Vec::new(),
            path_truncated: false,
        });
    }

    let (folder_path, path_truncated) = build_folder_path(record, client, gateway, scope).await;
    Ok(LocationReport {
        category: LocationCategory::PersonalDrive,
        folder_path,
        path_truncated,
    })
}

/// Walk the first-parent chain upward, collecting folder names outermost
/// first. Returns the partial path and whether it was truncated by an
/// inaccessible ancestor, excessive depth or a cycle.
async fn build_folder_path(
    record: &FileRecord,
    client: &Arc<dyn DriveClient>,
    gateway: &Gateway,
    scope: &str,
) -> (Vec<String>, bool) {
    let mut names: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut next = record.parents.first().cloned();
    let mut truncated = false;

    while let Some(parent_id) = next {
        if !visited.insert(parent_id.clone()) || visited.len() > MAX_ANCESTOR_DEPTH {
            debug!(file = %record.id, parent = %parent_id, "ancestor walk cut off");
            truncated = true;
            break;
        }

        let parent = match gateway
            .call("resolve_ancestor", || client.get_file(scope, &parent_id))
            .await
        {
            Ok(parent) => parent,
            Err(e) => {
                // Dead end: keep whatever path we have.
                debug!(file = %record.id, parent = %parent_id, error = %e, "ancestor inaccessible");
                truncated = true;
                break;
            }
        };

        if parent.name != MY_DRIVE_ROOT {
            names.push(parent.name.clone());
        }
        next = parent.parents.first().cloned();
    }

    names.reverse();
    (names, truncated)
}

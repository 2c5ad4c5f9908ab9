//! Vendor drive API surface.
//!
//! [`DriveClient`] is the seam every external lookup goes through; the
//! production implementation lives in [`http`], tests script a
//! [`mock::MockDriveClient`]. Per-user authenticated clients are resolved
//! through an explicit [`ClientPool`] rather than a global map.

pub mod http;

use crate::error::ApiError;
use crate::types::{FilePage, FileRecord, Permission};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Structured body of a document: ordered text runs and embedded objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBody {
    pub elements: Vec<DocElement>,
}

/// One element of a document body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DocElement {
    /// A text run, optionally carrying an explicit hyperlink.
    Text {
        content: String,
        link: Option<String>,
    },
    /// An embedded object (image, drawing), optionally linked.
    EmbeddedObject { link: Option<String> },
}

/// Cell grid of a spreadsheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetGrid {
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub title: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub value: Option<String>,
    pub formula: Option<String>,
    pub hyperlink: Option<String>,
    /// Data-validation rule text, which can also embed URLs.
    pub validation_rule: Option<String>,
}

/// Page elements of a presentation, slide by slide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationDeck {
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub elements: Vec<PageElement>,
    pub speaker_notes: Option<String>,
}

/// A slide element. Groups nest arbitrarily.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    pub text: Option<String>,
    pub link: Option<String>,
    #[serde(default)]
    pub children: Vec<PageElement>,
}

/// Authenticated access to one user's drive estate.
///
/// All methods are raw single attempts; retries and backoff are the
/// gateway's job.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// One page of the user's file listing.
    async fn list_files(
        &self,
        scope: &str,
        page_token: Option<&str>,
    ) -> Result<FilePage, ApiError>;

    /// Metadata for a single file.
    async fn get_file(&self, scope: &str, file_id: &str) -> Result<FileRecord, ApiError>;

    /// Permission list of a file.
    async fn list_permissions(&self, scope: &str, file_id: &str)
        -> Result<Vec<Permission>, ApiError>;

    /// Structured document body.
    async fn fetch_document(&self, scope: &str, file_id: &str) -> Result<DocumentBody, ApiError>;

    /// Spreadsheet cell grid.
    async fn fetch_spreadsheet(
        &self,
        scope: &str,
        file_id: &str,
    ) -> Result<SpreadsheetGrid, ApiError>;

    /// Presentation page elements.
    async fn fetch_presentation(
        &self,
        scope: &str,
        file_id: &str,
    ) -> Result<PresentationDeck, ApiError>;

    /// Membership of a shared drive, as permissions on the drive itself.
    async fn list_drive_members(
        &self,
        scope: &str,
        drive_id: &str,
    ) -> Result<Vec<Permission>, ApiError>;
}

/// Builds an authenticated client for one user scope.
pub trait ClientFactory: Send + Sync {
    fn build(&self, scope: &str) -> Result<Arc<dyn DriveClient>, ApiError>;
}

/// Explicit per-user client cache.
///
/// Replaces the usual global authenticated-client map: constructed once,
/// passed to the orchestrator and processor.
pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    clients: DashMap<String, Arc<dyn DriveClient>>,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
        }
    }

    /// Pool that hands out the same client for every scope. Used when one
    /// credential covers the whole tenant, and by tests.
    pub fn shared(client: Arc<dyn DriveClient>) -> Self {
        struct SharedFactory(Arc<dyn DriveClient>);
        impl ClientFactory for SharedFactory {
            fn build(&self, _scope: &str) -> Result<Arc<dyn DriveClient>, ApiError> {
                Ok(self.0.clone())
            }
        }
        Self::new(Arc::new(SharedFactory(client)))
    }

    /// Authenticated client for `scope`, built on first use.
    pub fn client_for(&self, scope: &str) -> Result<Arc<dyn DriveClient>, ApiError> {
        if let Some(client) = self.clients.get(scope) {
            return Ok(client.clone());
        }
        let client = self.factory.build(scope)?;
        self.clients.insert(scope.to_string(), client.clone());
        Ok(client)
    }
}

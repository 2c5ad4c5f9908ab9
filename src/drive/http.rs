//! HTTP implementation of [`DriveClient`].
//!
//! Talks to a Drive-style REST API with a bearer token. A single shared
//! connection-pooled client is lazily initialised and reused for every
//! request; per-user instances differ only in their token.

use super::{
    Cell, DocElement, DocumentBody, DriveClient, PageElement, PresentationDeck, Sheet, Slide,
    SpreadsheetGrid,
};
use crate::error::ApiError;
use crate::types::{
    ContentType, FilePage, FileRecord, Owner, Permission, PermissionSubject,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

/// Shared HTTP client for all drive API calls.
///
/// 30s timeout for metadata/content fetches, pooled connections for the
/// batched pipeline.
static DRIVE_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create drive HTTP client")
});

/// Bearer-token client against one API base URL.
pub struct HttpDriveClient {
    base_url: String,
    token: String,
}

impl HttpDriveClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            token: token.into(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = DRIVE_CLIENT
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::BadResponse(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), body))
}

// Wire shapes. Field presence follows the vendor's partial responses, so
// everything non-essential is optional with serde defaults.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileList {
    #[serde(default)]
    files: Vec<WireFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    owners: Vec<WireOwner>,
    #[serde(default)]
    parents: Vec<String>,
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    shared: bool,
    #[serde(default)]
    permissions: Vec<WirePermission>,
    drive_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOwner {
    email_address: Option<String>,
    domain: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePermission {
    #[serde(rename = "type")]
    kind: String,
    role: Option<String>,
    email_address: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePermissionList {
    #[serde(default)]
    permissions: Vec<WirePermission>,
}

impl From<WireFile> for FileRecord {
    fn from(w: WireFile) -> Self {
        FileRecord {
            content_type: ContentType::from_mime(&w.mime_type),
            id: w.id,
            name: w.name,
            mime_type: w.mime_type,
            owners: w.owners.into_iter().map(Owner::from).collect(),
            parents: w.parents,
            modified_at: w.modified_time.unwrap_or_else(Utc::now),
            size: w.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            shared: w.shared,
            permissions: w.permissions.into_iter().map(Permission::from).collect(),
            drive_id: w.drive_id,
        }
    }
}

impl From<WireOwner> for Owner {
    fn from(w: WireOwner) -> Self {
        Owner {
            email: w.email_address,
            domain: w.domain,
            display_name: w.display_name,
        }
    }
}

impl From<WirePermission> for Permission {
    fn from(w: WirePermission) -> Self {
        let subject = match w.kind.as_str() {
            "anyone" => PermissionSubject::Anyone,
            "domain" => PermissionSubject::Domain,
            _ => PermissionSubject::Individual,
        };
        Permission {
            subject,
            role: w.role.unwrap_or_else(|| "reader".to_string()),
            email: w.email_address,
            domain: w.domain,
        }
    }
}

const FILE_FIELDS: &str =
    "id,name,mimeType,owners,parents,modifiedTime,size,shared,permissions,driveId";

#[async_trait]
impl DriveClient for HttpDriveClient {
    async fn list_files(
        &self,
        _scope: &str,
        page_token: Option<&str>,
    ) -> Result<FilePage, ApiError> {
        let mut path = format!("/files?pageSize=1000&fields=nextPageToken,files({FILE_FIELDS})");
        if let Some(token) = page_token {
            path.push_str("&pageToken=");
            path.push_str(token);
        }
        let list: WireFileList = self.get_json(&path).await?;
        Ok(FilePage {
            files: list.files.into_iter().map(FileRecord::from).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn get_file(&self, _scope: &str, file_id: &str) -> Result<FileRecord, ApiError> {
        let file: WireFile = self
            .get_json(&format!("/files/{file_id}?fields={FILE_FIELDS}"))
            .await?;
        Ok(file.into())
    }

    async fn list_permissions(
        &self,
        _scope: &str,
        file_id: &str,
    ) -> Result<Vec<Permission>, ApiError> {
        let list: WirePermissionList = self
            .get_json(&format!(
                "/files/{file_id}/permissions?fields=permissions(type,role,emailAddress,domain)"
            ))
            .await?;
        Ok(list.permissions.into_iter().map(Permission::from).collect())
    }

    async fn fetch_document(&self, _scope: &str, file_id: &str) -> Result<DocumentBody, ApiError> {
        let body: WireDocument = self.get_json(&format!("/documents/{file_id}")).await?;
        Ok(body.into())
    }

    async fn fetch_spreadsheet(
        &self,
        _scope: &str,
        file_id: &str,
    ) -> Result<SpreadsheetGrid, ApiError> {
        let grid: WireSpreadsheet = self
            .get_json(&format!("/spreadsheets/{file_id}?includeGridData=true"))
            .await?;
        Ok(grid.into())
    }

    async fn fetch_presentation(
        &self,
        _scope: &str,
        file_id: &str,
    ) -> Result<PresentationDeck, ApiError> {
        let deck: WirePresentation = self.get_json(&format!("/presentations/{file_id}")).await?;
        Ok(deck.into())
    }

    async fn list_drive_members(
        &self,
        _scope: &str,
        drive_id: &str,
    ) -> Result<Vec<Permission>, ApiError> {
        let list: WirePermissionList = self
            .get_json(&format!(
                "/drives/{drive_id}/permissions?fields=permissions(type,role,emailAddress,domain)"
            ))
            .await?;
        Ok(list.permissions.into_iter().map(Permission::from).collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    #[serde(default)]
    elements: Vec<WireDocElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocElement {
    text: Option<String>,
    link: Option<String>,
    #[serde(default)]
    embedded: bool,
}

impl From<WireDocument> for DocumentBody {
    fn from(w: WireDocument) -> Self {
        DocumentBody {
            elements: w
                .elements
                .into_iter()
                .map(|e| {
                    if e.embedded {
                        DocElement::EmbeddedObject { link: e.link }
                    } else {
                        DocElement::Text {
                            content: e.text.unwrap_or_default(),
                            link: e.link,
                        }
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSpreadsheet {
    #[serde(default)]
    sheets: Vec<WireSheet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSheet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    cells: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCell {
    value: Option<String>,
    formula: Option<String>,
    hyperlink: Option<String>,
    validation_rule: Option<String>,
}

impl From<WireSpreadsheet> for SpreadsheetGrid {
    fn from(w: WireSpreadsheet) -> Self {
        SpreadsheetGrid {
            sheets: w
                .sheets
                .into_iter()
                .map(|s| Sheet {
                    title: s.title,
                    cells: s
                        .cells
                        .into_iter()
                        .map(|c| Cell {
                            value: c.value,
                            formula: c.formula,
                            hyperlink: c.hyperlink,
                            validation_rule: c.validation_rule,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePresentation {
    #[serde(default)]
    slides: Vec<WireSlide>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSlide {
    #[serde(default)]
    elements: Vec<WirePageElement>,
    speaker_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePageElement {
    text: Option<String>,
    link: Option<String>,
    #[serde(default)]
    children: Vec<WirePageElement>,
}

impl From<WireSlide> for Slide {
    fn from(w: WireSlide) -> Self {
        Slide {
            elements: w.elements.into_iter().map(PageElement::from).collect(),
            speaker_notes: w.speaker_notes,
        }
    }
}

impl From<WirePageElement> for PageElement {
    fn from(w: WirePageElement) -> Self {
        PageElement {
            text: w.text,
            link: w.link,
            children: w.children.into_iter().map(PageElement::from).collect(),
        }
    }
}

impl From<WirePresentation> for PresentationDeck {
    fn from(w: WirePresentation) -> Self {
        PresentationDeck {
            slides: w.slides.into_iter().map(Slide::from).collect(),
        }
    }
}

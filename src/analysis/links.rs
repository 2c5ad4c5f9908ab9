//! Link-extraction sub-analyser.
//!
//! Walks a file's structured content (text runs, embedded objects, cell
//! formulas and validations, slide elements including nested groups and
//! speaker notes), collects raw URLs, deduplicates them in first-seen order,
//! resolves drive-file links to name/type via a metadata lookup, and
//! classifies the rest as ecosystem or external. Spreadsheets additionally
//! yield the intersection of used formula functions with the fixed
//! platform-specific list; that intersection drives the migration flag.

use crate::config::Config;
use crate::drive::{Cell, DocElement, DriveClient, PageElement};
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::types::{ContentType, ExtractedLink, FileRecord, LinkReport, LinkTarget};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>)\]}]+"#).expect("url regex"));

/// File-id capture for `/d/{id}`-style and `?id={id}`-style drive URLs.
static DRIVE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:/d/|[?&]id=)([A-Za-z0-9_-]{10,})").expect("drive id regex")
});

static FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z][A-Za-z0-9_.]*)\s*\(").expect("function regex"));

/// Formula functions that do not survive migration off the platform.
/// Intersection with the functions actually used, not mere content presence,
/// is what sets the migration flag.
const INCOMPATIBLE_FUNCTIONS: &[&str] = &[
    "GOOGLEFINANCE",
    "GOOGLETRANSLATE",
    "IMPORTRANGE",
    "IMPORTHTML",
    "IMPORTDATA",
    "IMPORTFEED",
    "IMPORTXML",
    "SPARKLINE",
    "ARRAYFORMULA",
    "QUERY",
    "DETECTLANGUAGE",
    "IMAGE",
];

/// Extract, deduplicate, resolve and classify the links of one file.
pub async fn extract_links(
    record: &FileRecord,
    client: &Arc<dyn DriveClient>,
    gateway: &Gateway,
    config: &Config,
    scope: &str,
) -> Result<LinkReport, ApiError> {
    let mut raw = RawLinks::default();

    match record.content_type {
        ContentType::Document => {
            let body = gateway
                .call("fetch_document", || client.fetch_document(scope, &record.id))
                .await?;
            for element in &body.elements {
                collect_doc_element(element, &mut raw);
            }
        }
        ContentType::Spreadsheet => {
            let grid = gateway
                .call("fetch_spreadsheet", || {
                    client.fetch_spreadsheet(scope, &record.id)
                })
                .await?;
            for sheet in &grid.sheets {
                for cell in &sheet.cells {
                    collect_cell(cell, &mut raw);
                }
            }
        }
        ContentType::Presentation => {
            let deck = gateway
                .call("fetch_presentation", || {
                    client.fetch_presentation(scope, &record.id)
                })
                .await?;
            for slide in &deck.slides {
                for element in &slide.elements {
                    collect_page_element(element, &mut raw);
                }
                if let Some(notes) = &slide.speaker_notes {
                    raw.scan_text(notes);
                }
            }
        }
        // Folders and opaque binaries carry no walkable content.
        ContentType::Folder | ContentType::Other => {}
    }

    let mut links = Vec::with_capacity(raw.urls.len());
    for url in &raw.urls {
        links.push(classify_link(url, client, gateway, config, scope).await);
    }

    let incompatible_functions: Vec<String> = raw
        .functions
        .iter()
        .filter(|f| INCOMPATIBLE_FUNCTIONS.contains(&f.as_str()))
        .cloned()
        .collect();
    let migration_flag = !incompatible_functions.is_empty();

    debug!(
        file = %record.id,
        links = links.len(),
        incompatible = incompatible_functions.len(),
        "link extraction complete"
    );

    Ok(LinkReport {
        links,
        incompatible_functions,
        migration_flag,
    })
}

/// URLs in first-seen order plus the set of formula function names used.
#[derive(Default)]
struct RawLinks {
    urls: Vec<String>,
    seen: HashSet<String>,
    functions: BTreeSet<String>,
}

impl RawLinks {
    fn push_url(&mut self, url: &str) {
        let url = url.trim_end_matches(['.', ',', ';']);
        if self.seen.insert(url.to_string()) {
            self.urls.push(url.to_string());
        }
    }

    fn scan_text(&mut self, text: &str) {
        for m in URL_RE.find_iter(text) {
            self.push_url(m.as_str());
        }
    }

    fn scan_formula(&mut self, formula: &str) {
        self.scan_text(formula);
        for cap in FUNCTION_RE.captures_iter(formula) {
            self.functions.insert(cap[1].to_uppercase());
        }
    }
}

fn collect_doc_element(element: &DocElement, raw: &mut RawLinks) {
    match element {
        DocElement::Text { content, link } => {
            raw.scan_text(content);
            if let Some(link) = link {
                raw.push_url(link);
            }
        }
        DocElement::EmbeddedObject { link } => {
            if let Some(link) = link {
                raw.push_url(link);
            }
        }
    }
}

fn collect_cell(cell: &Cell, raw: &mut RawLinks) {
    if let Some(value) = &cell.value {
        raw.scan_text(value);
    }
    if let Some(formula) = &cell.formula {
        raw.scan_formula(formula);
    }
    if let Some(hyperlink) = &cell.hyperlink {
        raw.push_url(hyperlink);
    }
    if let Some(rule) = &cell.validation_rule {
        raw.scan_text(rule);
    }
}

// Groups nest arbitrarily; walk them iteratively.
fn collect_page_element(root: &PageElement, raw: &mut RawLinks) {
    let mut stack = vec![root];
    while let Some(element) = stack.pop() {
        if let Some(text) = &element.text {
            raw.scan_text(text);
        }
        if let Some(link) = &element.link {
            raw.push_url(link);
        }
        stack.extend(element.children.iter());
    }
}

async fn classify_link(
    url: &str,
    client: &Arc<dyn DriveClient>,
    gateway: &Gateway,
    config: &Config,
    scope: &str,
) -> ExtractedLink {
    if let Some(file_id) = drive_file_id(url, &config.ecosystem_domains) {
        // Resolution failure leaves the link unresolved, never fails the
        // analysis.
        let target = match gateway
            .call("resolve_link", || client.get_file(scope, &file_id))
            .await
        {
            Ok(record) => LinkTarget::DriveFile {
                file_id,
                name: Some(record.name),
                content_type: Some(record.content_type),
            },
            Err(e) => {
                debug!(url, error = %e, "drive link did not resolve");
                LinkTarget::DriveFile {
                    file_id,
                    name: None,
                    content_type: None,
                }
            }
        };
        return ExtractedLink {
            url: url.to_string(),
            target,
        };
    }

    let target = match url_host(url) {
        Some(host) if config.ecosystem_domains.iter().any(|d| d == host) => LinkTarget::Ecosystem,
        _ => LinkTarget::External,
    };
    ExtractedLink {
        url: url.to_string(),
        target,
    }
}

/// File id embedded in a drive-style URL, when the host is one of the
/// configured ecosystem domains.
fn drive_file_id(url: &str, ecosystem_domains: &[String]) -> Option<String> {
    let host = url_host(url)?;
    if !ecosystem_domains.iter().any(|d| d == host) {
        return None;
    }
    DRIVE_ID_RE
        .captures(url)
        .map(|cap| cap[1].to_string())
}

fn url_host(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    Some(host.split(':').next().unwrap_or(host))
}

//! Error Sentinel: recognises known failure pages right after each navigation.

use std::fmt;

use scraper::Html;
use serde::{Deserialize, Serialize};

use super::html::{is_present, select_doc, text_of};

/// Closed set of failure signatures the portal is known to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageErrorKind {
    ServiceUnavailable,
    NotFound,
    ProxyError,
    InternalError,
    MaintenanceMode,
}

impl fmt::Display for PageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PageErrorKind::ServiceUnavailable => "service unavailable (503)",
            PageErrorKind::NotFound => "not found (404)",
            PageErrorKind::ProxyError => "proxy error",
            PageErrorKind::InternalError => "internal error (500)",
            PageErrorKind::MaintenanceMode => "maintenance mode",
        };
        f.write_str(label)
    }
}

/// Error notification published over the session bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEvent {
    pub kind: PageErrorKind,
    /// The heading or marker text that matched.
    pub payload: String,
    /// Page load the event belongs to.
    pub load: u64,
}

const MAINTENANCE_MARKERS: &str = "#maintenance, .maintenance-page";

// Checked in order; the first phrase found in a heading wins.
const SIGNATURES: &[(PageErrorKind, &[&str])] = &[
    (
        PageErrorKind::MaintenanceMode,
        &["en maintenance", "maintenance en cours", "under maintenance"],
    ),
    (PageErrorKind::ProxyError, &["proxy error", "bad gateway"]),
    (
        PageErrorKind::ServiceUnavailable,
        &[
            "503 service",
            "service unavailable",
            "service temporarily unavailable",
            "service indisponible",
        ],
    ),
    (
        PageErrorKind::InternalError,
        &["500 internal", "internal server error", "erreur interne"],
    ),
    (
        PageErrorKind::NotFound,
        &["404 not found", "not found", "page introuvable"],
    ),
];

/// Match a rendered page against the known failure signatures.
pub fn detect(html: &str) -> Option<(PageErrorKind, String)> {
    let doc = Html::parse_document(html);

    if is_present(&doc, MAINTENANCE_MARKERS) {
        let payload = select_doc(&doc, MAINTENANCE_MARKERS)
            .into_iter()
            .next()
            .map(text_of)
            .unwrap_or_default();
        return Some((PageErrorKind::MaintenanceMode, payload));
    }

    let headings: Vec<String> = select_doc(&doc, "title, h1, h2")
        .into_iter()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    SIGNATURES.iter().find_map(|(kind, phrases)| {
        headings.iter().find_map(|heading| {
            let lower = heading.to_lowercase();
            phrases
                .iter()
                .any(|phrase| lower.contains(phrase))
                .then(|| (*kind, heading.clone()))
        })
    })
}

/// Per-page-load bookkeeping so one load publishes at most one event.
#[derive(Debug, Default)]
pub struct Sentinel {
    load: u64,
    reported: Option<u64>,
}

impl Sentinel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a new page load and return its number.
    pub fn begin_load(&mut self) -> u64 {
        self.load += 1;
        self.load
    }

    /// Scan the current page. Returns an event only the first time a
    /// signature is seen for the current load.
    pub fn inspect(&mut self, html: &str) -> Option<PageEvent> {
        if self.reported == Some(self.load) {
            return None;
        }
        let (kind, payload) = detect(html)?;
        self.reported = Some(self.load);
        Some(PageEvent {
            kind,
            payload,
            load: self.load,
        })
    }
}

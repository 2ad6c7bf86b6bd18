//! Page-layout capability: what differs between site generations.
//!
//! The navigator's state machine is the same for both generations; only
//! paths, markers and row parsing go through [`PageLayout`].

mod legacy;
mod modern;

pub use legacy::LegacyLayout;
pub use modern::ModernLayout;

use scraper::Html;
use serde::{Deserialize, Serialize};

use super::extract::{BillRows, RawContract, RawContractDoc, RawIdentity};
use super::html::is_present;
use super::site::LEGACY_MARKER;

/// Site paths that depend on the generation.
#[derive(Debug)]
pub struct LayoutPaths {
    pub home: &'static str,
    pub contract_list: &'static str,
    pub bills: &'static str,
    /// Older generations have no contract document page.
    pub contract_docs: Option<&'static str>,
    pub identity: &'static str,
}

/// Elements whose presence identifies a page or leads to the next one.
#[derive(Debug)]
pub struct LayoutMarkers {
    pub home: &'static str,
    pub manage_accounts: &'static str,
    pub contract_list: &'static str,
    pub bills: &'static str,
    pub contract_docs: Option<&'static str>,
    pub identity_link: &'static str,
    pub identity_title: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    Modern,
    Legacy,
}

static MODERN: ModernLayout = ModernLayout;
static LEGACY: LegacyLayout = LegacyLayout;

impl LayoutKind {
    pub fn layout(self) -> &'static dyn PageLayout {
        match self {
            LayoutKind::Modern => &MODERN,
            LayoutKind::Legacy => &LEGACY,
        }
    }

    /// Pick the generation from the site-version marker of a rendered page.
    pub fn detect(doc: &Html) -> Self {
        if is_present(doc, LEGACY_MARKER) {
            LayoutKind::Legacy
        } else {
            LayoutKind::Modern
        }
    }
}

pub trait PageLayout: Send + Sync {
    fn paths(&self) -> &'static LayoutPaths;

    fn markers(&self) -> &'static LayoutMarkers;

    /// Per-row "switch context" control for a contract on the listing.
    fn switch_control(&self, contract_number: &str) -> String;

    fn contract_list(&self, doc: &Html) -> Vec<RawContract>;

    /// The single implicit contract shown on a home page.
    fn home_contract(&self, doc: &Html) -> Option<RawContract>;

    fn bill_rows(&self, doc: &Html) -> BillRows;

    fn contract_docs(&self, doc: &Html) -> Vec<RawContractDoc>;

    fn identity(&self, doc: &Html) -> RawIdentity;
}

/// Escape a value for use inside a double-quoted CSS attribute selector.
pub(crate) fn css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

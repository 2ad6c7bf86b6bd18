//! Extractor: page-local reads producing typed intermediate records.
//!
//! Everything here runs on the execution side against the page as it is
//! right now; nothing is kept once the reply has been sent.

use anyhow::Result;
use scraper::Html;
use secrecy::SecretString;

use super::driver::PageDriver;
use super::layout::LayoutKind;
use super::site::{LOGIN_INPUT, PASSWORD_INPUT};
use crate::models::DocumentType;

/// Credentials typed into the login form by a human.
#[derive(Debug, Clone)]
pub struct ScrapedLogin {
    pub login: String,
    pub secret: SecretString,
}

/// One entry of a contract listing, possibly still rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContract {
    pub number: Option<String>,
    pub address: Option<String>,
    pub client_ref: Option<String>,
    /// The contract active in the current session.
    pub active: bool,
}

impl RawContract {
    /// Both the formatted address and the client reference have rendered.
    pub fn is_resolved(&self) -> bool {
        self.address.is_some() && self.client_ref.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Invoice,
    Schedule,
}

/// One invoice or schedule row as the page shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub kind: RowKind,
    pub reference: Option<String>,
    pub date: Option<String>,
    pub amount: Option<String>,
    pub status: Option<String>,
    pub href: Option<String>,
    /// Energy given by an icon on the row itself; wins over the section.
    pub picto: Option<DocumentType>,
}

/// Rows of the bills page, electricity first.
///
/// Rows before `separation` come from the electricity section, rows at or
/// after it from the gas section. `None` means the page has no energy
/// sections at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillRows {
    pub rows: Vec<RawRow>,
    pub separation: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContractDoc {
    pub energy: Option<String>,
    pub start_date: Option<String>,
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phones: Vec<String>,
    /// Formatted address and, when the page links it, its contract number.
    pub addresses: Vec<(String, Option<String>)>,
}

/// Fixed set of page reads the navigator may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    LoginForm,
    ContractList,
    HomeContract,
    Bills,
    ContractDocs,
    Identity,
}

#[derive(Debug, Clone)]
pub enum Extracted {
    LoginForm(Option<ScrapedLogin>),
    ContractList(Vec<RawContract>),
    HomeContract(Option<RawContract>),
    Bills(BillRows),
    ContractDocs(Vec<RawContractDoc>),
    Identity(RawIdentity),
}

pub async fn extract(
    driver: &dyn PageDriver,
    layout: LayoutKind,
    what: Extraction,
) -> Result<Extracted> {
    if what == Extraction::LoginForm {
        let login = driver.input_value(LOGIN_INPUT).await?;
        let secret = driver.input_value(PASSWORD_INPUT).await?;
        let scraped = match (login, secret) {
            (Some(login), Some(secret)) if !login.trim().is_empty() && !secret.is_empty() => {
                Some(ScrapedLogin {
                    login: login.trim().to_string(),
                    secret: SecretString::from(secret),
                })
            }
            _ => None,
        };
        return Ok(Extracted::LoginForm(scraped));
    }

    let content = driver.content().await?;
    Ok(parse(&content, layout, what))
}

/// Parse already-fetched page content. `Html` is not `Send`, so it never
/// lives across an await point.
fn parse(content: &str, layout: LayoutKind, what: Extraction) -> Extracted {
    let doc = Html::parse_document(content);
    let layout = layout.layout();
    match what {
        Extraction::ContractList => Extracted::ContractList(layout.contract_list(&doc)),
        Extraction::HomeContract => Extracted::HomeContract(layout.home_contract(&doc)),
        Extraction::Bills => Extracted::Bills(layout.bill_rows(&doc)),
        Extraction::ContractDocs => Extracted::ContractDocs(layout.contract_docs(&doc)),
        Extraction::Identity => Extracted::Identity(layout.identity(&doc)),
        Extraction::LoginForm => Extracted::LoginForm(None),
    }
}

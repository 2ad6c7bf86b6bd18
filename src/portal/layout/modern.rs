//! Current site generation: multi-contract listing, split energy sections.

use scraper::{ElementRef, Html};

use super::{css_string, LayoutMarkers, LayoutPaths, PageLayout};
use crate::models::DocumentType;
use crate::portal::extract::{BillRows, RawContract, RawContractDoc, RawIdentity, RawRow, RowKind};
use crate::portal::html::{attr, doc_text, first_attr, first_text, select_all, select_doc, text_of};

static PATHS: LayoutPaths = LayoutPaths {
    home: "/clients/mon-compte",
    contract_list: "/clients/mon-compte/mes-contrats",
    bills: "/clients/mes-factures",
    contract_docs: Some("/clients/mon-contrat"),
    identity: "/clients/mon-compte/mes-infos",
};

static MARKERS: LayoutMarkers = LayoutMarkers {
    home: ".dashboard",
    manage_accounts: "a.header-account__manage",
    contract_list: ".contract-selection",
    bills: ".invoices",
    contract_docs: Some(".contract-docs"),
    identity_link: "a.header-account__infos",
    identity_title: "h1.personal-info__title",
};

#[derive(Debug, Default)]
pub struct ModernLayout;

/// Energy shown by a picto inside a row, if any.
pub(crate) fn picto_type(row: ElementRef<'_>) -> Option<DocumentType> {
    if !select_all(row, "span.picto__puce__gaz").is_empty() {
        Some(DocumentType::Gas)
    } else if !select_all(row, "span.picto__puce__elec").is_empty() {
        Some(DocumentType::Electricity)
    } else {
        None
    }
}

fn bill_row(row: ElementRef<'_>) -> RawRow {
    let kind = match row.value().attr("data-kind") {
        Some("schedule") => RowKind::Schedule,
        _ => RowKind::Invoice,
    };
    RawRow {
        kind,
        reference: attr(row, "data-ref"),
        date: first_text(row, ".invoice-row__date"),
        amount: first_text(row, ".invoice-row__amount"),
        status: first_text(row, ".invoice-row__status"),
        href: first_attr(row, "a.invoice-row__download", "href"),
        picto: picto_type(row),
    }
}

fn section_rows(doc: &Html, section: &str) -> Option<Vec<RawRow>> {
    let section = select_doc(doc, section).into_iter().next()?;
    Some(select_all(section, ".invoice-row").into_iter().map(bill_row).collect())
}

impl PageLayout for ModernLayout {
    fn paths(&self) -> &'static LayoutPaths {
        &PATHS
    }

    fn markers(&self) -> &'static LayoutMarkers {
        &MARKERS
    }

    fn switch_control(&self, contract_number: &str) -> String {
        format!(
            ".contract-selection__switch[data-contract-number=\"{}\"]",
            css_string(contract_number)
        )
    }

    fn contract_list(&self, doc: &Html) -> Vec<RawContract> {
        select_doc(doc, ".contract-selection .contract-selection__item")
            .into_iter()
            .map(|item| RawContract {
                number: attr(item, "data-contract-number"),
                address: first_text(item, ".contract-selection__address"),
                client_ref: first_text(item, ".contract-selection__client-ref"),
                active: item.value().classes().any(|c| c == "is-active"),
            })
            .collect()
    }

    fn home_contract(&self, doc: &Html) -> Option<RawContract> {
        let block = select_doc(doc, ".dashboard__contract").into_iter().next()?;
        Some(RawContract {
            number: attr(block, "data-contract-number"),
            address: first_text(block, ".dashboard__address"),
            client_ref: first_text(block, ".dashboard__client-ref"),
            active: true,
        })
    }

    fn bill_rows(&self, doc: &Html) -> BillRows {
        let elec = section_rows(doc, ".invoices__section--elec");
        let gas = section_rows(doc, ".invoices__section--gas");
        let other = section_rows(doc, ".invoices__section--other").unwrap_or_default();

        let separation =
            (elec.is_some() || gas.is_some()).then(|| elec.as_ref().map_or(0, Vec::len));
        let mut rows = elec.unwrap_or_default();
        rows.extend(gas.unwrap_or_default());
        // Rows outside both energy sections are tagged explicitly so the
        // separation index does not claim them.
        rows.extend(other.into_iter().map(|mut row| {
            if row.picto.is_none() {
                row.picto = Some(DocumentType::Other);
            }
            row
        }));

        BillRows { rows, separation }
    }

    fn contract_docs(&self, doc: &Html) -> Vec<RawContractDoc> {
        select_doc(doc, ".contract-docs .contract-docs__item")
            .into_iter()
            .map(|item| RawContractDoc {
                energy: attr(item, "data-energy"),
                start_date: first_text(item, ".contract-docs__start"),
                href: first_attr(item, "a.contract-docs__download", "href"),
            })
            .collect()
    }

    fn identity(&self, doc: &Html) -> RawIdentity {
        RawIdentity {
            name: doc_text(doc, ".personal-info__name"),
            email: doc_text(doc, ".personal-info__email"),
            phones: select_doc(doc, ".personal-info__phone")
                .into_iter()
                .map(text_of)
                .filter(|p| !p.is_empty())
                .collect(),
            addresses: select_doc(doc, ".personal-info__address")
                .into_iter()
                .map(|a| (text_of(a), attr(a, "data-contract-number")))
                .filter(|(text, _)| !text.is_empty())
                .collect(),
        }
    }
}

//! Older TYPO3 site generation: one history list where each emitted bill
//! carries its own payment-schedule table.

use scraper::{ElementRef, Html};

use super::modern::picto_type;
use super::{css_string, LayoutMarkers, LayoutPaths, PageLayout};
use crate::portal::extract::{BillRows, RawContract, RawContractDoc, RawIdentity, RawRow, RowKind};
use crate::portal::html::{attr, doc_text, first_text, select_all, select_doc, text_of};

static PATHS: LayoutPaths = LayoutPaths {
    home: "/clients/mon-compte",
    contract_list: "/mon-compte/gerer-mes-comptes",
    bills: "/mes-factures/ma-facture-mon-echeancier/",
    contract_docs: None,
    identity: "/mon-compte/mes-infos",
};

static MARKERS: LayoutMarkers = LayoutMarkers {
    home: ".ec_fr_accueil",
    manage_accounts: "a.ec_fr_gerer_comptes",
    contract_list: ".ec_fr_liste_comptes",
    bills: ".ec_fr_historique_facture_echeancier__liste",
    contract_docs: None,
    identity_link: "a.ec_fr_mes_infos",
    identity_title: "h1.ec_fr_mes_infos__titre",
};

const PAID_IMAGE_SUFFIX: &str = "ech_ok.png";

#[derive(Debug, Default)]
pub struct LegacyLayout;

fn account_block(block: ElementRef<'_>) -> RawContract {
    RawContract {
        number: attr(block, "data-contract-number")
            .or_else(|| first_text(block, ".compte__numero")),
        address: first_text(block, ".compte__adresse"),
        client_ref: first_text(block, ".compte__reference"),
        active: block.value().classes().any(|c| c == "compte-actif"),
    }
}

fn download_link(block: ElementRef<'_>) -> Option<String> {
    select_all(block, "a[href]")
        .into_iter()
        .find(|a| text_of(*a).contains("Télécharger"))
        .and_then(|a| attr(a, "href"))
        .filter(|href| href != "#")
}

fn is_paid(tr: ElementRef<'_>) -> bool {
    select_all(tr, "img[src]").into_iter().any(|img| {
        img.value()
            .attr("src")
            .is_some_and(|src| src.ends_with(PAID_IMAGE_SUFFIX))
    })
}

/// Paid schedule entries only; unpaid ones are not documents yet.
fn schedule_rows(block: ElementRef<'_>) -> Vec<RawRow> {
    let picto = picto_type(block);
    let href = download_link(block);

    select_all(block, "table tbody tr")
        .into_iter()
        .filter(|tr| is_paid(*tr))
        .map(|tr| {
            let cells: Vec<String> = select_all(tr, "td").into_iter().map(text_of).collect();
            let cell = |i: usize| cells.get(i).cloned().filter(|c| !c.is_empty());
            RawRow {
                kind: RowKind::Schedule,
                reference: None,
                date: cell(2),
                amount: cell(1),
                status: Some("Payée".to_string()),
                href: href.clone(),
                picto,
            }
        })
        .collect()
}

impl PageLayout for LegacyLayout {
    fn paths(&self) -> &'static LayoutPaths {
        &PATHS
    }

    fn markers(&self) -> &'static LayoutMarkers {
        &MARKERS
    }

    fn switch_control(&self, contract_number: &str) -> String {
        format!(
            "a.compte__acces[data-contract-number=\"{}\"]",
            css_string(contract_number)
        )
    }

    fn contract_list(&self, doc: &Html) -> Vec<RawContract> {
        select_doc(doc, ".ec_fr_liste_comptes .compte")
            .into_iter()
            .map(account_block)
            .collect()
    }

    fn home_contract(&self, doc: &Html) -> Option<RawContract> {
        select_doc(doc, ".compte-actif")
            .into_iter()
            .next()
            .map(account_block)
    }

    fn bill_rows(&self, doc: &Html) -> BillRows {
        let rows = select_doc(doc, ".ec_fr_historique_facture_echeancier__liste > div > .row")
            .into_iter()
            .flat_map(schedule_rows)
            .collect();
        // Energy comes from each block's picto, not from page sections.
        BillRows {
            rows,
            separation: None,
        }
    }

    fn contract_docs(&self, _doc: &Html) -> Vec<RawContractDoc> {
        Vec::new()
    }

    fn identity(&self, doc: &Html) -> RawIdentity {
        RawIdentity {
            name: doc_text(doc, "#ec-infos-nom"),
            email: doc_text(doc, "#ec-infos-email"),
            phones: select_doc(doc, ".ec-infos-telephone")
                .into_iter()
                .map(text_of)
                .filter(|p| !p.is_empty())
                .collect(),
            addresses: select_doc(doc, ".ec-infos-adresse")
                .into_iter()
                .map(|a| (text_of(a), attr(a, "data-contract-number")))
                .filter(|(text, _)| !text.is_empty())
                .collect(),
        }
    }
}

//! Document Classifier & Normalizer: raw page rows to [`Document`]s.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Url;
use rust_decimal::Decimal;

use super::error::HarvestError;
use super::extract::{BillRows, RawContractDoc, RawRow, RowKind};
use crate::models::{Document, DocumentDraft, DocumentKind, DocumentType, PaymentStatus};

/// A payment status with the date embedded in its phrase, when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatus {
    pub status: PaymentStatus,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAmount {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

/// The two disjoint document sets handed to persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routed {
    pub priced: Vec<Document>,
    pub companion: Vec<Document>,
}

// Lowercased prefixes, checked in order.
const STATUS_PHRASES: &[(&str, Status)] = &[
    ("payée", Status::Paid),
    ("payé", Status::Paid),
    ("réglée", Status::Paid),
    ("remboursée", Status::Refunded),
    ("remboursé", Status::Refunded),
    ("en attente", Status::Pending),
    ("à payer", Status::Pending),
    ("a payer", Status::Pending),
    ("à régler", Status::Pending),
    ("a régler", Status::Pending),
    ("terminé", Status::Ended),
    ("échéance passée", Status::Ended),
    ("echeance passee", Status::Ended),
];

#[derive(Debug, Clone, Copy)]
enum Status {
    Paid,
    Refunded,
    Pending,
    Ended,
}

const CURRENCIES: &[(&str, &str)] = &[
    ("€", "EUR"),
    ("eur", "EUR"),
    ("$", "USD"),
    ("usd", "USD"),
    ("£", "GBP"),
    ("gbp", "GBP"),
];

/// Turns raw rows into documents for one vendor.
#[derive(Debug, Clone)]
pub struct Classifier {
    vendor: String,
    base_url: Option<Url>,
    amount: Regex,
    date: Regex,
}

impl Classifier {
    pub fn new(vendor: impl Into<String>, base_url: &str) -> Result<Self> {
        let amount = Regex::new(
            r"(?P<sign>-)?\s*(?:(?P<grouped>\d{1,3}(?:[ \x{a0}\x{202f}.]\d{3})+(?:,\d+)?)|(?P<plain>\d+(?:[.,]\d+)?))",
        )
        .context("Failed to compile amount pattern")?;
        let date = Regex::new(r"(\d{2})/(\d{2})/(\d{4})").context("Failed to compile date pattern")?;

        Ok(Self {
            vendor: vendor.into(),
            base_url: Url::parse(base_url).ok(),
            amount,
            date,
        })
    }

    /// First `DD/MM/YYYY` date in `raw`.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let caps = self.date.captures(raw)?;
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let year = caps.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Map a vendor status phrase. Paid and refunded phrases keep their
    /// embedded date when it parses; it is never guessed.
    pub fn parse_status(&self, raw: &str) -> ParsedStatus {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ParsedStatus {
                status: PaymentStatus::NoStatus,
                date: None,
            };
        }

        let lower = trimmed.to_lowercase();
        let known = STATUS_PHRASES
            .iter()
            .find(|(phrase, _)| lower.starts_with(phrase))
            .map(|(_, status)| *status);

        match known {
            Some(Status::Paid) => ParsedStatus {
                status: PaymentStatus::Paid,
                date: self.parse_date(trimmed),
            },
            Some(Status::Refunded) => ParsedStatus {
                status: PaymentStatus::Refunded,
                date: self.parse_date(trimmed),
            },
            Some(Status::Pending) => ParsedStatus {
                status: PaymentStatus::Pending,
                date: None,
            },
            Some(Status::Ended) => ParsedStatus {
                status: PaymentStatus::Ended,
                date: None,
            },
            None => ParsedStatus {
                status: PaymentStatus::Unknown(trimmed.to_string()),
                date: None,
            },
        }
    }

    /// Amount and currency from a displayed price such as `"1 234,56 €"`.
    /// Without a number, neither is returned.
    pub fn parse_amount(&self, raw: &str) -> ParsedAmount {
        let Some(caps) = self.amount.captures(raw) else {
            return ParsedAmount::default();
        };

        let digits = if let Some(grouped) = caps.name("grouped") {
            grouped
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == ',')
                .collect::<String>()
                .replace(',', ".")
        } else if let Some(plain) = caps.name("plain") {
            plain.as_str().replace(',', ".")
        } else {
            return ParsedAmount::default();
        };

        let Ok(mut amount) = Decimal::from_str(&digits) else {
            return ParsedAmount::default();
        };
        if caps.name("sign").is_some() {
            amount.set_sign_negative(true);
        }

        let lower = raw.to_lowercase();
        let currency = CURRENCIES
            .iter()
            .find(|(symbol, _)| lower.contains(symbol))
            .map(|(_, code)| code.to_string());

        ParsedAmount {
            amount: Some(amount),
            currency,
        }
    }

    fn file_url(&self, href: Option<&str>) -> Option<String> {
        let href = href?.trim();
        if href.is_empty() {
            return None;
        }
        match &self.base_url {
            Some(base) => base.join(href).ok().map(String::from),
            None => Some(href.to_string()),
        }
    }

    /// Documents for the bills page. Rows missing a field of their
    /// identity are logged and skipped; other missing fields stay absent.
    pub fn bills(&self, bills: &BillRows) -> Vec<Document> {
        bills
            .rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let document_type = row_type(row, index, bills.separation);
                match self.bill(row, document_type) {
                    Ok(doc) => Some(doc),
                    Err(err) => {
                        tracing::warn!(row = index, error = %err, "Skipping bill row");
                        None
                    }
                }
            })
            .collect()
    }

    fn bill(&self, row: &RawRow, document_type: DocumentType) -> Result<Document, HarvestError> {
        let date = row
            .date
            .as_deref()
            .and_then(|d| self.parse_date(d))
            .ok_or_else(|| {
                HarvestError::MalformedSourceData(format!(
                    "row has no readable date ({:?})",
                    row.date
                ))
            })?;

        let kind = match row.kind {
            RowKind::Invoice => DocumentKind::Invoice,
            RowKind::Schedule => DocumentKind::PaymentScheduleEntry,
        };

        let vendor_ref = match (&row.reference, row.kind) {
            (Some(reference), _) => reference.clone(),
            (None, RowKind::Schedule) => format!(
                "echeance-{}-{}",
                document_type.tag(),
                date.format("%Y%m%d")
            ),
            (None, RowKind::Invoice) => {
                return Err(HarvestError::MalformedSourceData(format!(
                    "invoice dated {date} has no reference"
                )))
            }
        };

        let ParsedAmount { amount, currency } = row
            .amount
            .as_deref()
            .map(|a| self.parse_amount(a))
            .unwrap_or_default();
        let status = self.parse_status(row.status.as_deref().unwrap_or_default());

        Ok(Document::new(DocumentDraft {
            kind,
            vendor: self.vendor.clone(),
            vendor_ref: Some(vendor_ref),
            amount,
            currency,
            date,
            payment_status: status.status,
            status_date: status.date,
            file_url: self.file_url(row.href.as_deref()),
            document_type,
        }))
    }

    /// Contract PDFs of the initially active contract.
    pub fn contracts(&self, docs: &[RawContractDoc]) -> Vec<Document> {
        docs.iter()
            .filter_map(|raw| {
                let Some(date) = raw.start_date.as_deref().and_then(|d| self.parse_date(d)) else {
                    let err = HarvestError::MalformedSourceData(format!(
                        "contract has no readable start date ({:?})",
                        raw.start_date
                    ));
                    tracing::warn!(error = %err, "Skipping contract document");
                    return None;
                };
                let document_type = raw
                    .energy
                    .as_deref()
                    .map(DocumentType::from_label)
                    .unwrap_or(DocumentType::Other);

                Some(Document::new(DocumentDraft {
                    kind: DocumentKind::ContractPdf,
                    vendor: self.vendor.clone(),
                    vendor_ref: None,
                    amount: None,
                    currency: None,
                    date,
                    payment_status: PaymentStatus::NoStatus,
                    status_date: None,
                    file_url: self.file_url(raw.href.as_deref()),
                    document_type,
                }))
            })
            .collect()
    }
}

/// Energy of one row: its own picto first, then the page section.
fn row_type(row: &RawRow, index: usize, separation: Option<usize>) -> DocumentType {
    if let Some(picto) = row.picto {
        return picto;
    }
    match separation {
        Some(separation) if index < separation => DocumentType::Electricity,
        Some(_) => DocumentType::Gas,
        None => DocumentType::Other,
    }
}

/// Split documents by whether they carry an amount. Every document lands
/// in exactly one of the two sets.
pub fn route_documents(documents: Vec<Document>) -> Routed {
    let (priced, companion) = documents.into_iter().partition(Document::is_priced);
    Routed { priced, companion }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new("Direct Energie", "https://portal.test/clients/").unwrap()
    }

    fn row(kind: RowKind, reference: Option<&str>, date: &str, amount: Option<&str>) -> RawRow {
        RawRow {
            kind,
            reference: reference.map(str::to_string),
            date: Some(date.to_string()),
            amount: amount.map(str::to_string),
            status: None,
            href: None,
            picto: None,
        }
    }

    #[test]
    fn known_status_phrases() {
        let c = classifier();
        assert_eq!(
            c.parse_status("Payée le 12/01/2024"),
            ParsedStatus {
                status: PaymentStatus::Paid,
                date: NaiveDate::from_ymd_opt(2024, 1, 12),
            }
        );
        assert_eq!(
            c.parse_status(""),
            ParsedStatus {
                status: PaymentStatus::NoStatus,
                date: None,
            }
        );
        assert_eq!(
            c.parse_status("Une phrase inconnue").status,
            PaymentStatus::Unknown("Une phrase inconnue".to_string())
        );
        assert_eq!(c.parse_status("À payer").status, PaymentStatus::Pending);
        assert_eq!(c.parse_status("Terminé").status, PaymentStatus::Ended);
    }

    #[test]
    fn paid_without_readable_date_keeps_status_only() {
        let parsed = classifier().parse_status("Remboursée le 31/02/2024");
        assert_eq!(parsed.status, PaymentStatus::Refunded);
        assert_eq!(parsed.date, None);
    }

    #[test]
    fn amounts_and_currencies() {
        let c = classifier();
        assert_eq!(
            c.parse_amount("45,30 €"),
            ParsedAmount {
                amount: Some(Decimal::new(4530, 2)),
                currency: Some("EUR".to_string()),
            }
        );
        assert_eq!(
            c.parse_amount("1\u{a0}234,56 EUR").amount,
            Some(Decimal::new(123456, 2))
        );
        assert_eq!(c.parse_amount("1.234,00 €").amount, Some(Decimal::new(123400, 2)));
        assert_eq!(c.parse_amount("12.50").amount, Some(Decimal::new(1250, 2)));
        assert_eq!(c.parse_amount("- 8,00 €").amount, Some(Decimal::new(-800, 2)));
        assert_eq!(c.parse_amount("à venir"), ParsedAmount::default());
    }

    #[test]
    fn rows_take_type_from_section_unless_a_picto_says_otherwise() {
        let mut gas_picto = row(RowKind::Invoice, Some("F2"), "01/02/2024", Some("10 €"));
        gas_picto.picto = Some(DocumentType::Gas);
        let bills = BillRows {
            rows: vec![
                row(RowKind::Invoice, Some("F1"), "01/01/2024", Some("10 €")),
                gas_picto,
                row(RowKind::Invoice, Some("F3"), "01/03/2024", Some("10 €")),
            ],
            separation: Some(2),
        };
        let docs = classifier().bills(&bills);
        let types: Vec<_> = docs.iter().map(Document::document_type).collect();
        assert_eq!(
            types,
            vec![DocumentType::Electricity, DocumentType::Gas, DocumentType::Gas]
        );
    }

    #[test]
    fn malformed_rows_are_skipped_and_schedules_get_a_reference() {
        let mut linked = row(RowKind::Invoice, Some("F9"), "12/01/2024", Some("45,30 €"));
        linked.href = Some("documents/F9.pdf".to_string());
        let bills = BillRows {
            rows: vec![
                row(RowKind::Invoice, None, "12/01/2024", Some("45,30 €")),
                row(RowKind::Invoice, Some("F8"), "bientôt", Some("45,30 €")),
                row(RowKind::Schedule, None, "05/03/2024", None),
                linked,
            ],
            separation: None,
        };
        let docs = classifier().bills(&bills);
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].kind(), DocumentKind::PaymentScheduleEntry);
        assert_eq!(docs[0].vendor_ref(), Some("echeance-autre-20240305"));
        assert_eq!(docs[0].amount(), None);
        assert_eq!(docs[0].file_url(), None);

        assert_eq!(
            docs[1].file_url(),
            Some("https://portal.test/clients/documents/F9.pdf")
        );
        assert_eq!(docs[1].filename(), "2024-01-12_direct-energie_45.30EUR_facture_f9.pdf");
    }

    #[test]
    fn routing_is_a_partition() {
        let bills = BillRows {
            rows: vec![
                row(RowKind::Invoice, Some("F1"), "01/01/2024", Some("10,00 €")),
                row(RowKind::Schedule, None, "01/02/2024", None),
                row(RowKind::Schedule, None, "01/03/2024", Some("62,00 €")),
            ],
            separation: Some(3),
        };
        let docs = classifier().bills(&bills);
        let total = docs.len();
        let routed = route_documents(docs);
        assert_eq!(routed.priced.len() + routed.companion.len(), total);
        assert!(routed.priced.iter().all(Document::is_priced));
        assert!(routed.companion.iter().all(|d| !d.is_priced()));
        assert_eq!(routed.companion.len(), 1);
    }

    #[test]
    fn contract_documents_have_no_vendor_ref() {
        let docs = classifier().contracts(&[
            RawContractDoc {
                energy: Some("Électricité".to_string()),
                start_date: Some("01/06/2021".to_string()),
                href: Some("/clients/contrat.pdf".to_string()),
            },
            RawContractDoc::default(),
        ]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind(), DocumentKind::ContractPdf);
        assert_eq!(docs[0].vendor_ref(), None);
        assert_eq!(docs[0].document_type(), DocumentType::Electricity);
        assert_eq!(docs[0].file_url(), Some("https://portal.test/clients/contrat.pdf"));
    }
}

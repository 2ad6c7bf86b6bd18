use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Version of the stored document metadata. Records written with any other
/// version (or none) are rewritten on the next save.
pub const METADATA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    PaymentScheduleEntry,
    ContractPdf,
}

impl DocumentKind {
    fn tag(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "facture",
            DocumentKind::PaymentScheduleEntry => "echeance",
            DocumentKind::ContractPdf => "contrat",
        }
    }

    /// Natural dedup key, in order.
    pub fn file_id_attributes(self) -> &'static [&'static str] {
        match self {
            DocumentKind::ContractPdf => &["filename"],
            DocumentKind::Invoice | DocumentKind::PaymentScheduleEntry => &["vendorRef", "filename"],
        }
    }

    pub fn qualification_label(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "energy_invoice",
            DocumentKind::PaymentScheduleEntry => "payment_schedule",
            DocumentKind::ContractPdf => "energy_contract",
        }
    }
}

/// Energy a document relates to, from its page section or picto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Electricity,
    Gas,
    Other,
}

impl DocumentType {
    pub fn tag(self) -> &'static str {
        match self {
            DocumentType::Electricity => "elec",
            DocumentType::Gas => "gaz",
            DocumentType::Other => "autre",
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            DocumentType::Electricity => "electricity",
            DocumentType::Gas => "gas",
            DocumentType::Other => "other",
        }
    }

    /// Map a vendor energy label ("elec", "Électricité", "gaz", ...).
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.starts_with("gaz") || label.starts_with("gas") {
            DocumentType::Gas
        } else if label.starts_with("elec") || label.starts_with("élec") {
            DocumentType::Electricity
        } else {
            DocumentType::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "raw", rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Refunded,
    Pending,
    Ended,
    NoStatus,
    /// A vendor phrase we do not recognise, kept verbatim.
    Unknown(String),
}

/// Everything needed to build a [`Document`], before its filename is derived.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub kind: DocumentKind,
    pub vendor: String,
    pub vendor_ref: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub date: NaiveDate,
    pub payment_status: PaymentStatus,
    pub status_date: Option<NaiveDate>,
    pub file_url: Option<String>,
    pub document_type: DocumentType,
}

/// A harvested bill, schedule entry or contract. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    kind: DocumentKind,
    vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vendor_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    date: NaiveDate,
    payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_url: Option<String>,
    filename: String,
    document_type: DocumentType,
}

impl Document {
    pub fn new(mut draft: DocumentDraft) -> Self {
        // Contracts are identified by filename only.
        if draft.kind == DocumentKind::ContractPdf {
            draft.vendor_ref = None;
        }
        let filename = compute_filename(&draft);
        let DocumentDraft {
            kind,
            vendor,
            vendor_ref,
            amount,
            currency,
            date,
            payment_status,
            status_date,
            file_url,
            document_type,
        } = draft;

        Self {
            kind,
            vendor,
            vendor_ref,
            amount,
            currency,
            date,
            payment_status,
            status_date,
            file_url,
            filename,
            document_type,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn vendor_ref(&self) -> Option<&str> {
        self.vendor_ref.as_deref()
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.amount
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn payment_status(&self) -> &PaymentStatus {
        &self.payment_status
    }

    pub fn status_date(&self) -> Option<NaiveDate> {
        self.status_date
    }

    pub fn file_url(&self) -> Option<&str> {
        self.file_url.as_deref()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Documents with an amount go to the priced-bill sink, the rest are companion files.
    pub fn is_priced(&self) -> bool {
        self.amount.is_some()
    }

    pub fn file_id_attributes(&self) -> &'static [&'static str] {
        self.kind.file_id_attributes()
    }

    /// Storage category within a contract folder.
    pub fn category(&self) -> &'static str {
        match self.kind {
            DocumentKind::ContractPdf => "contracts",
            _ => self.document_type.category(),
        }
    }

    /// Value of one dedup attribute, by its external name.
    pub fn id_attribute(&self, name: &str) -> Option<&str> {
        match name {
            "vendorRef" => self.vendor_ref(),
            "filename" => Some(self.filename()),
            _ => None,
        }
    }
}

fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Deterministic filename: `<date>_<vendor>_<amount><currency>_<kind>`, or
/// the kind and energy tags when the document carries no price, then the
/// vendor reference when there is one.
fn compute_filename(draft: &DocumentDraft) -> String {
    let date = draft.date.format("%Y-%m-%d");
    let vendor = slug(&draft.vendor);
    let kind = draft.kind.tag();
    let energy = draft.document_type.tag();

    let mut name = match (draft.amount, draft.currency.as_deref()) {
        (Some(amount), Some(currency)) => {
            format!("{date}_{vendor}_{:.2}{}_{kind}", amount, currency.to_uppercase())
        }
        (Some(amount), None) => format!("{date}_{vendor}_{:.2}_{kind}_{energy}", amount),
        (None, _) => format!("{date}_{vendor}_{kind}_{energy}"),
    };
    if let Some(reference) = draft.vendor_ref.as_deref().map(slug).filter(|r| !r.is_empty()) {
        name.push('_');
        name.push_str(&reference);
    }
    name.push_str(".pdf");
    name
}

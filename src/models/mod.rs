mod contract;
mod document;
mod identity;

pub use contract::ContractRef;
pub use document::{
    Document, DocumentDraft, DocumentKind, DocumentType, PaymentStatus, METADATA_VERSION,
};
pub use identity::{Identity, PostalAddress};

use std::time::Duration;

use super::sentinel::PageErrorKind;

pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

/// Why a harvest run stopped, or why one step of it could not go on.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The portal rejected the submitted login. Not retried.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The portal is down: a page error survived a reload, or maintenance
    /// mode was announced before login. Fatal for the run.
    #[error("vendor unavailable: {reason}")]
    VendorDown {
        reason: String,
        kind: Option<PageErrorKind>,
    },

    /// The contact-information link is missing or its page never loaded.
    #[error("contact information link missing")]
    MissingIdentityLink,

    /// The listing offers no way to switch to this contract: it has no switch
    /// control and is not the active one.
    #[error("contract {0} cannot be selected from the listing")]
    ContractUnreachable(String),

    /// A scraped row lacks a field that is part of its identity.
    #[error("malformed source data: {0}")]
    MalformedSourceData(String),

    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("harvest cancelled")]
    Cancelled,

    /// Neither an identity email nor a login is known at the end of the run.
    #[error("could not establish a source account identifier")]
    NoAccountIdentifier,

    #[error("session bridge closed")]
    BridgeClosed,

    #[error("unexpected bridge reply to {command}")]
    UnexpectedReply { command: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    pub fn is_vendor_down(&self) -> bool {
        matches!(self, HarvestError::VendorDown { .. })
    }
}

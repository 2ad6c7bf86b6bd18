use serde::{Deserialize, Serialize};

/// Postal address from the contact page, optionally tied to one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,
}

/// The account holder, as shown on the contact-information page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<PostalAddress>,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phones.is_empty()
            && self.addresses.is_empty()
    }
}

use serde::{Deserialize, Serialize};

/// A contract number paired with the postal address it supplies.
///
/// This pairing is the grouping key for document storage paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRef {
    pub contract_number: String,
    pub linked_address: String,
}

impl ContractRef {
    pub fn new(contract_number: impl Into<String>, linked_address: impl Into<String>) -> Self {
        Self {
            contract_number: contract_number.into(),
            linked_address: linked_address.into(),
        }
    }

    /// Folder label for this contract, `"<contractNumber> - <linkedAddress>"`.
    pub fn folder(&self) -> String {
        let label = format!("{} - {}", self.contract_number.trim(), self.linked_address.trim());
        label
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '-',
                c => c,
            })
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Logical sub-path for one document category of this contract.
    pub fn sub_path(&self, category: &str) -> String {
        format!("{}/{}", self.folder(), category)
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One destination-ledger account, declared in `bankaccounts.def` as
/// `external-id | ledger name | type`.
///
/// `priority` is the declaration order (0 = highest). When both legs
/// of an inter-account transfer show up in the inputs, the leg whose
/// source account has the lower rank number is the one that survives
/// deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// External identifier (IBAN or institution account number),
    /// lowercased.
    pub external_id: String,
    /// Account name in the destination ledger, e.g. "Assets:Checking".
    pub name: String,
    /// Ledger writer account type tag ("Bank", "Invst", ...).
    pub kind: String,
    pub priority: usize,
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("account id '{0}' is declared twice")]
    DuplicateId(String),
}

/// The loaded set of ledger accounts, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Vec<LedgerAccount>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an account, assigning the next priority rank.
    pub fn insert(&mut self, external_id: &str, name: &str, kind: &str) -> Result<(), RegistryError> {
        if self.get(external_id).is_some() {
            return Err(RegistryError::DuplicateId(external_id.to_string()));
        }
        self.accounts.push(LedgerAccount {
            external_id: external_id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            priority: self.accounts.len(),
        });
        Ok(())
    }

    pub fn get(&self, external_id: &str) -> Option<&LedgerAccount> {
        self.accounts.iter().find(|a| a.external_id == external_id)
    }

    /// Reverse lookup by ledger name. Several external ids may map to
    /// the same ledger name; the first-declared (highest-priority)
    /// entry wins so that priority comparisons are deterministic.
    pub fn get_by_name(&self, name: &str) -> Option<&LedgerAccount> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerAccount> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

use thiserror::Error;

use csv2qif_core::{AccountRegistry, Transaction};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("account '{0}' is not declared in the account definitions")]
    UnknownAccount(String),
}

/// Attaches ledger account names to the source and counter side of
/// every transaction.
///
/// This stage runs twice: once before categorization, so only
/// transactions without a resolved counter side are candidates for a
/// category, and once after, because a matched category can itself
/// name a ledger account — in that case the counter id and name are
/// back-filled from the registry.
///
/// An unknown source account is a broken configuration, not broken
/// data: every input file belongs to a declared account.
pub fn resolve_account_names(
    registry: &AccountRegistry,
    transactions: &mut [Transaction],
) -> Result<(), ResolveError> {
    for tx in transactions {
        let source = registry
            .get(&tx.account_id)
            .ok_or_else(|| ResolveError::UnknownAccount(tx.account_id.clone()))?;
        tx.account_name = source.name.clone();

        tx.counter_name = registry
            .get(&tx.counter_id)
            .map(|a| a.name.clone())
            .unwrap_or_default();

        if let Some(category) = &tx.category {
            if let Some(account) = registry.get_by_name(category) {
                tx.counter_id = account.external_id.clone();
                tx.counter_name = account.name.clone();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use csv2qif_core::Money;

    fn registry() -> AccountRegistry {
        let mut reg = AccountRegistry::new();
        reg.insert("nl11rabo0123456789", "Assets:Checking", "Bank").unwrap();
        reg.insert("nl22ingb0987654321", "Assets:Savings", "Bank").unwrap();
        reg
    }

    fn tx(account_id: &str, counter_id: &str) -> Transaction {
        Transaction {
            counter_id: counter_id.to_string(),
            ..Transaction::cash(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                account_id,
                Money::zero(),
            )
        }
    }

    #[test]
    fn fills_source_and_counter_names() {
        let mut txs = vec![tx("nl11rabo0123456789", "nl22ingb0987654321")];
        resolve_account_names(&registry(), &mut txs).unwrap();
        assert_eq!(txs[0].account_name, "Assets:Checking");
        assert_eq!(txs[0].counter_name, "Assets:Savings");
    }

    #[test]
    fn external_counter_stays_unresolved() {
        let mut txs = vec![tx("nl11rabo0123456789", "nl99bank0000000000")];
        resolve_account_names(&registry(), &mut txs).unwrap();
        assert_eq!(txs[0].counter_name, "");
        assert!(!txs[0].has_counter_account());
    }

    #[test]
    fn unknown_source_account_is_fatal() {
        let mut txs = vec![tx("nl99bank0000000000", "")];
        assert!(matches!(
            resolve_account_names(&registry(), &mut txs),
            Err(ResolveError::UnknownAccount(id)) if id == "nl99bank0000000000"
        ));
    }

    #[test]
    fn category_naming_a_ledger_account_backfills_counter() {
        let mut txs = vec![tx("nl11rabo0123456789", "")];
        txs[0].category = Some("Assets:Savings".to_string());
        resolve_account_names(&registry(), &mut txs).unwrap();
        assert_eq!(txs[0].counter_id, "nl22ingb0987654321");
        assert_eq!(txs[0].counter_name, "Assets:Savings");
    }

    #[test]
    fn expense_category_does_not_backfill() {
        let mut txs = vec![tx("nl11rabo0123456789", "")];
        txs[0].category = Some("Expenses:Groceries".to_string());
        resolve_account_names(&registry(), &mut txs).unwrap();
        assert_eq!(txs[0].counter_id, "");
        assert_eq!(txs[0].counter_name, "");
    }
}

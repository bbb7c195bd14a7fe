use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "Buy",
            TradeAction::Sell => "Sell",
        }
    }
}

/// Fields only a security buy/sell carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityTrade {
    /// Instrument identifier (ISIN).
    pub security: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub commission: Money,
    pub action: TradeAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionKind {
    Cash,
    SecurityTrade(SecurityTrade),
}

/// The canonical, institution-agnostic record one extractor row
/// becomes. Counter-account and category start out empty and are
/// filled in by the resolution and categorization stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    /// External id of the account this row was exported from
    /// (lowercased).
    pub account_id: String,
    /// Ledger name of the source account, filled by resolution.
    pub account_name: String,
    /// External id of the other side; empty = unresolved/external.
    pub counter_id: String,
    /// Ledger name of the other side; empty = unresolved.
    pub counter_name: String,
    /// Institution sequence / order id, used as the check number.
    pub sequence: String,
    pub payee: String,
    pub memo: String,
    pub category: Option<String>,
    /// Positive = increases the source account balance.
    pub amount: Money,
    /// Running balance after the transaction, where the export
    /// provides one.
    pub balance: Option<Money>,
    pub kind: TransactionKind,
}

impl Transaction {
    /// A cash transaction with the pipeline-filled fields still empty.
    pub fn cash(date: NaiveDate, account_id: &str, amount: Money) -> Self {
        Transaction {
            date,
            account_id: account_id.to_string(),
            account_name: String::new(),
            counter_id: String::new(),
            counter_name: String::new(),
            sequence: String::new(),
            payee: String::new(),
            memo: String::new(),
            category: None,
            amount,
            balance: None,
            kind: TransactionKind::Cash,
        }
    }

    pub fn security_trade(
        date: NaiveDate,
        account_id: &str,
        amount: Money,
        trade: SecurityTrade,
    ) -> Self {
        Transaction {
            kind: TransactionKind::SecurityTrade(trade),
            ..Transaction::cash(date, account_id, amount)
        }
    }

    pub fn is_cash(&self) -> bool {
        matches!(self.kind, TransactionKind::Cash)
    }

    /// True once the counter side resolved to a ledger account.
    pub fn has_counter_account(&self) -> bool {
        !self.counter_name.is_empty()
    }
}

pub mod account;
pub mod money;
pub mod transaction;

pub use account::{AccountRegistry, LedgerAccount, RegistryError};
pub use money::Money;
pub use transaction::{SecurityTrade, TradeAction, Transaction, TransactionKind};

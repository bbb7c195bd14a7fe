//! QIF rendering for the converted transaction stream.
//!
//! The pipeline hands this crate a set of ledger accounts and, per
//! account, an ordered list of canonical transactions; it produces a
//! QIF file GnuCash can import. Field tags follow the QIF reference:
//! <https://www.w3.org/2000/10/swap/pim/qif-doc/QIF-doc.htm>

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use csv2qif_core::{Transaction, TransactionKind};

#[derive(Debug, Error)]
pub enum QifError {
    #[error("cannot write {file}: {source}")]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },
    #[error("no QIF account named '{0}'")]
    UnknownAccount(String),
}

struct QifAccount {
    name: String,
    kind: String,
    transactions: Vec<Transaction>,
}

/// Accumulates accounts and their transactions, then renders the
/// whole file at once.
#[derive(Default)]
pub struct QifWriter {
    accounts: Vec<QifAccount>,
}

impl QifWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ledger account. Several external account ids may
    /// map onto one ledger name; the account block must still appear
    /// only once, so a repeated name is a no-op.
    pub fn add_account(&mut self, name: &str, kind: &str) {
        if self.accounts.iter().any(|a| a.name == name) {
            return;
        }
        self.accounts.push(QifAccount {
            name: name.to_string(),
            kind: kind.to_string(),
            transactions: Vec::new(),
        });
    }

    /// Appends a transaction to the named account, keeping arrival
    /// order within the account.
    pub fn append(&mut self, account_name: &str, tx: Transaction) -> Result<(), QifError> {
        let account = self
            .accounts
            .iter_mut()
            .find(|a| a.name == account_name)
            .ok_or_else(|| QifError::UnknownAccount(account_name.to_string()))?;
        account.transactions.push(tx);
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        // Account list first, then per-account transaction blocks.
        for account in &self.accounts {
            render_account_header(&mut out, account);
        }

        for account in &self.accounts {
            if account.transactions.is_empty() {
                continue;
            }
            render_account_header(&mut out, account);

            let cash: Vec<&Transaction> = account
                .transactions
                .iter()
                .filter(|tx| tx.is_cash())
                .collect();
            let trades: Vec<&Transaction> = account
                .transactions
                .iter()
                .filter(|tx| !tx.is_cash())
                .collect();

            if !cash.is_empty() {
                out.push_str("!Type:Bank\n");
                for tx in cash {
                    render_cash(&mut out, tx);
                }
            }
            if !trades.is_empty() {
                out.push_str("!Type:Invst\n");
                for tx in trades {
                    render_trade(&mut out, tx);
                }
            }
        }

        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), QifError> {
        std::fs::write(path, self.render()).map_err(|e| QifError::Io {
            file: path.to_path_buf(),
            source: e,
        })
    }
}

fn render_account_header(out: &mut String, account: &QifAccount) {
    let _ = write!(out, "!Account\nN{}\nT{}\n^\n", account.name, account.kind);
}

fn render_cash(out: &mut String, tx: &Transaction) {
    let _ = write!(out, "D{}\nT{}\n", tx.date.format("%Y-%m-%d"), tx.amount);
    if !tx.payee.is_empty() {
        let _ = writeln!(out, "P{}", tx.payee);
    }
    if !tx.memo.is_empty() {
        let _ = writeln!(out, "M{}", tx.memo);
    }
    // A resolved counter account renders as a transfer target; a
    // category as a plain ledger line.
    if tx.has_counter_account() {
        let _ = writeln!(out, "L[{}]", tx.counter_name);
    } else if let Some(category) = &tx.category {
        let _ = writeln!(out, "L{category}");
    }
    if !tx.sequence.is_empty() {
        let _ = writeln!(out, "N{}", tx.sequence);
    }
    out.push_str("^\n");
}

fn render_trade(out: &mut String, tx: &Transaction) {
    let TransactionKind::SecurityTrade(trade) = &tx.kind else {
        return;
    };
    let _ = write!(
        out,
        "D{}\nN{}\nY{}\nI{}\nQ{}\nT{}\nO{}\n",
        tx.date.format("%Y-%m-%d"),
        trade.action.as_str(),
        trade.security,
        trade.price,
        trade.quantity,
        tx.amount,
        trade.commission,
    );
    if !tx.memo.is_empty() {
        let _ = writeln!(out, "M{}", tx.memo);
    }
    out.push_str("^\n");
}

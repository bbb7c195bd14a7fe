use csv2qif_core::{AccountRegistry, Transaction};

/// Run totals reported after deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub total: usize,
    pub suppressed: usize,
    pub uncategorized: usize,
}

/// Drops the redundant leg of transfers that were exported from both
/// sides.
///
/// When account A and account B are both declared and statements for
/// both are converted in one run, an A→B transfer shows up twice:
/// once as A→B with amount X and once as B→A with amount −X. Exactly
/// one copy may reach the ledger. The leg whose *source* account has
/// the better (numerically lower) priority rank survives; the other
/// is suppressed. Because the two legs compare the same pair of ranks
/// in opposite order, the outcome is the same whichever file was
/// parsed first.
///
/// Only Cash transactions with a positively resolved counter account
/// participate; transfers to external accounts have no second leg in
/// the inputs, and security trades are bookings inside one account.
pub fn suppress_transfer_echoes(
    transactions: Vec<Transaction>,
    registry: &AccountRegistry,
) -> (Vec<Transaction>, MergeStats) {
    let mut stats = MergeStats {
        total: transactions.len(),
        ..MergeStats::default()
    };

    let kept: Vec<Transaction> = transactions
        .into_iter()
        .filter(|tx| {
            if !tx.is_cash() || !tx.has_counter_account() {
                return true;
            }
            let (Some(source), Some(counter)) = (
                registry.get(&tx.account_id),
                registry.get_by_name(&tx.counter_name),
            ) else {
                return true;
            };
            if source.priority > counter.priority {
                tracing::debug!(
                    source = %source.name,
                    counter = %counter.name,
                    amount = %tx.amount,
                    "suppressing transfer echo"
                );
                stats.suppressed += 1;
                return false;
            }
            true
        })
        .collect();

    stats.uncategorized = uncategorized(&kept).len();
    (kept, stats)
}

/// The transactions that ended the pipeline with neither a category
/// nor a resolved counter account, sorted by lowercased memo for the
/// run summary. These are candidates for new category rules.
pub fn uncategorized(transactions: &[Transaction]) -> Vec<&Transaction> {
    let mut missing: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.is_cash() && tx.category.is_none() && !tx.has_counter_account())
        .collect();
    missing.sort_by_key(|tx| tx.memo.to_lowercase());
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use csv2qif_core::{Money, SecurityTrade, TradeAction};
    use rust_decimal::Decimal;

    fn registry() -> AccountRegistry {
        let mut reg = AccountRegistry::new();
        reg.insert("aaa", "Assets:Checking", "Bank").unwrap();
        reg.insert("bbb", "Assets:Savings", "Bank").unwrap();
        reg
    }

    fn leg(source: &str, counter_name: &str, amount: &str) -> Transaction {
        Transaction {
            counter_name: counter_name.to_string(),
            ..Transaction::cash(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                source,
                amount.parse().unwrap(),
            )
        }
    }

    #[test]
    fn keeps_the_higher_priority_leg() {
        let txs = vec![
            leg("aaa", "Assets:Savings", "100.00"),
            leg("bbb", "Assets:Checking", "-100.00"),
        ];
        let (kept, stats) = suppress_transfer_echoes(txs, &registry());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].account_id, "aaa");
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn outcome_is_independent_of_input_order() {
        let txs = vec![
            leg("bbb", "Assets:Checking", "-100.00"),
            leg("aaa", "Assets:Savings", "100.00"),
        ];
        let (kept, stats) = suppress_transfer_echoes(txs, &registry());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].account_id, "aaa");
        assert_eq!(stats.suppressed, 1);
    }

    #[test]
    fn unresolved_counter_is_never_suppressed() {
        // A transfer into an account outside the ledger has no second
        // leg to collide with.
        let txs = vec![leg("bbb", "", "-50.00")];
        let (kept, stats) = suppress_transfer_echoes(txs, &registry());
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.suppressed, 0);
    }

    #[test]
    fn security_trades_are_never_suppressed() {
        let trade = SecurityTrade {
            security: "IE00B3RBWM25".to_string(),
            price: Decimal::from(100),
            quantity: Decimal::from(1),
            commission: Money::zero(),
            action: TradeAction::Buy,
        };
        let mut tx = Transaction::security_trade(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "bbb",
            "-100.00".parse().unwrap(),
            trade,
        );
        tx.counter_name = "Assets:Checking".to_string();

        let (kept, stats) = suppress_transfer_echoes(vec![tx], &registry());
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.suppressed, 0);
    }

    #[test]
    fn uncategorized_listing_is_sorted_by_memo() {
        let mut a = leg("aaa", "", "-1.00");
        a.memo = "Zebra crossing".to_string();
        let mut b = leg("aaa", "", "-2.00");
        b.memo = "apple orchard".to_string();
        let mut c = leg("aaa", "", "-3.00");
        c.category = Some("Expenses:Known".to_string());
        c.memo = "already categorized".to_string();

        let txs = vec![a, b, c];
        let listing = uncategorized(&txs);
        let memos: Vec<&str> = listing.iter().map(|tx| tx.memo.as_str()).collect();
        assert_eq!(memos, ["apple orchard", "Zebra crossing"]);
    }

    #[test]
    fn stats_count_uncategorized_survivors() {
        let txs = vec![
            leg("aaa", "", "-1.00"),
            leg("aaa", "Assets:Savings", "100.00"),
        ];
        let (_, stats) = suppress_transfer_echoes(txs, &registry());
        assert_eq!(stats.uncategorized, 1);
    }
}

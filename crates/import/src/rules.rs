use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use csv2qif_core::Transaction;

use crate::util::read_latin1;

/// One row of the category rule table. Order in the table is
/// significant: rules are tried top to bottom and the first match
/// wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Replacement payee text; empty = keep the transaction's payee
    /// (memo rules only — a payee rule always overwrites).
    pub payee: String,
    pub category: String,
    pub payee_regex: String,
    pub memo_regex: String,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{file}: rule {index}: bad pattern '{pattern}': {source}")]
    BadPattern {
        file: PathBuf,
        index: usize,
        pattern: String,
        source: regex::Error,
    },
    #[error("{file}: rule row {index} does not have 4 columns")]
    ShortRow { file: PathBuf, index: usize },
}

/// Pairing of a rule with its precompiled patterns. Empty pattern
/// columns compile to `None` and never match.
struct CompiledRule {
    rule: CategoryRule,
    payee_re: Option<Regex>,
    memo_re: Option<Regex>,
}

pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

/// Compiles a pattern with "match" semantics: case-insensitive and
/// anchored at the start of the text.
fn compile(pattern: &str, file: &Path, index: usize) -> Result<Option<Regex>, RuleError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&format!("^(?:{pattern})"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| RuleError::BadPattern {
            file: file.to_path_buf(),
            index,
            pattern: pattern.to_string(),
            source: e,
        })
}

impl RuleSet {
    /// Declared order is kept exactly; no re-sorting.
    pub fn new(rules: Vec<CategoryRule>, source: &Path) -> Result<Self, RuleError> {
        let compiled = rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                Ok(CompiledRule {
                    payee_re: compile(&rule.payee_regex, source, index)?,
                    memo_re: compile(&rule.memo_regex, source, index)?,
                    rule,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(RuleSet { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies the first matching rule to one transaction. The payee
    /// in place before the rewrite is appended into the memo so no
    /// source text is lost.
    fn categorize(&self, tx: &mut Transaction) {
        for cr in &self.rules {
            if let Some(re) = &cr.payee_re {
                if !tx.payee.is_empty() && re.is_match(&tx.payee) {
                    tx.memo = format!("{}||{}", tx.payee, tx.memo);
                    tx.payee = cr.rule.payee.clone();
                    tx.category = Some(cr.rule.category.clone());
                    return;
                }
            }
            if let Some(re) = &cr.memo_re {
                if !tx.memo.is_empty() && re.is_match(&tx.memo) {
                    tx.memo = format!("{}||{}", tx.payee, tx.memo);
                    if !cr.rule.payee.is_empty() {
                        tx.payee = cr.rule.payee.clone();
                    }
                    tx.category = Some(cr.rule.category.clone());
                    return;
                }
            }
        }
    }
}

/// Categorizes every transaction whose counter side has not resolved
/// to a ledger account. A resolved counter account means the row is a
/// transfer between known accounts and needs no category.
pub fn categorize_all(transactions: &mut [Transaction], rules: &RuleSet) {
    for tx in transactions.iter_mut().filter(|tx| !tx.has_counter_account()) {
        rules.categorize(tx);
    }
}

/// Loads the 4-column rule table (`payee, category, payee-regex,
/// memo-regex`); the header row is skipped, declaration order is
/// preserved.
pub fn load_rules(path: &Path) -> Result<RuleSet, RuleError> {
    let content = read_latin1(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());

    let mut rules = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let row = record?;
        let get = |col: usize| -> Result<String, RuleError> {
            row.get(col)
                .map(str::to_string)
                .ok_or_else(|| RuleError::ShortRow {
                    file: path.to_path_buf(),
                    index,
                })
        };
        rules.push(CategoryRule {
            payee: get(0)?,
            category: get(1)?,
            payee_regex: get(2)?,
            memo_regex: get(3)?,
        });
    }

    tracing::debug!(count = rules.len(), file = %path.display(), "loaded category rules");
    RuleSet::new(rules, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use csv2qif_core::Money;

    fn tx(payee: &str, memo: &str) -> Transaction {
        Transaction {
            payee: payee.to_string(),
            memo: memo.to_string(),
            ..Transaction::cash(
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                "nl11rabo0123456789",
                Money::zero(),
            )
        }
    }

    fn rule(payee: &str, category: &str, payee_regex: &str, memo_regex: &str) -> CategoryRule {
        CategoryRule {
            payee: payee.to_string(),
            category: category.to_string(),
            payee_regex: payee_regex.to_string(),
            memo_regex: memo_regex.to_string(),
        }
    }

    fn ruleset(rules: Vec<CategoryRule>) -> RuleSet {
        RuleSet::new(rules, Path::new("categories.csv")).unwrap()
    }

    #[test]
    fn payee_rule_rewrites_payee_and_keeps_history() {
        let rules = ruleset(vec![rule("Amazon", "Expenses:Shopping", "^amazon.*", "")]);
        let mut txs = vec![tx("AMAZON EU SARL", "order 123-456")];
        categorize_all(&mut txs, &rules);

        assert_eq!(txs[0].payee, "Amazon");
        assert_eq!(txs[0].category.as_deref(), Some("Expenses:Shopping"));
        assert_eq!(txs[0].memo, "AMAZON EU SARL||order 123-456");
    }

    #[test]
    fn match_is_anchored_at_start() {
        let rules = ruleset(vec![rule("Amazon", "Expenses:Shopping", "amazon", "")]);
        let mut txs = vec![tx("refund from AMAZON", "")];
        categorize_all(&mut txs, &rules);
        assert!(txs[0].category.is_none(), "search semantics are wrong here");
    }

    #[test]
    fn first_declared_rule_wins() {
        let rules = ruleset(vec![
            rule("First", "Expenses:One", "^amazon", ""),
            rule("Second", "Expenses:Two", "^amazon", ""),
        ]);
        let mut txs = vec![tx("Amazon", "")];
        categorize_all(&mut txs, &rules);
        assert_eq!(txs[0].payee, "First");
        assert_eq!(txs[0].category.as_deref(), Some("Expenses:One"));
    }

    #[test]
    fn memo_rule_without_override_keeps_payee() {
        let rules = ruleset(vec![rule("", "Expenses:Groceries", "", "^betaalautomaat")]);
        let mut txs = vec![tx("Albert Heijn", "Betaalautomaat 14:23")];
        categorize_all(&mut txs, &rules);
        assert_eq!(txs[0].payee, "Albert Heijn");
        assert_eq!(txs[0].category.as_deref(), Some("Expenses:Groceries"));
        assert_eq!(txs[0].memo, "Albert Heijn||Betaalautomaat 14:23");
    }

    #[test]
    fn memo_rule_with_override_rewrites_payee() {
        let rules = ruleset(vec![rule("NS", "Expenses:Travel", "", "^ns reizigers")]);
        let mut txs = vec![tx("", "NS Reizigers BV week 3")];
        categorize_all(&mut txs, &rules);
        assert_eq!(txs[0].payee, "NS");
    }

    #[test]
    fn empty_patterns_never_match() {
        let rules = ruleset(vec![rule("X", "Expenses:X", "", "")]);
        let mut txs = vec![tx("payee", "memo")];
        categorize_all(&mut txs, &rules);
        assert!(txs[0].category.is_none());
    }

    #[test]
    fn resolved_counter_account_is_not_a_candidate() {
        let rules = ruleset(vec![rule("Amazon", "Expenses:Shopping", "^amazon", "")]);
        let mut txs = vec![tx("Amazon", "transfer")];
        txs[0].counter_name = "Assets:Savings".to_string();
        categorize_all(&mut txs, &rules);
        assert!(txs[0].category.is_none());
    }

    #[test]
    fn no_match_leaves_category_unset() {
        let rules = ruleset(vec![rule("Amazon", "Expenses:Shopping", "^amazon", "")]);
        let mut txs = vec![tx("Bakkerij Jansen", "brood")];
        categorize_all(&mut txs, &rules);
        assert!(txs[0].category.is_none());
        assert_eq!(txs[0].payee, "Bakkerij Jansen");
    }

    #[test]
    fn bad_pattern_is_a_load_error() {
        let result = RuleSet::new(
            vec![rule("X", "Expenses:X", "(unclosed", "")],
            Path::new("categories.csv"),
        );
        assert!(matches!(result, Err(RuleError::BadPattern { index: 0, .. })));
    }

    #[test]
    fn loads_rule_table_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.csv");
        std::fs::write(
            &path,
            "payee,category,payee-regex,memo-regex\n\
             Amazon,Expenses:Shopping,^amazon.*,\n\
             ,Expenses:Groceries,,^betaalautomaat\n",
        )
        .unwrap();

        let rules = load_rules(&path).unwrap();
        assert_eq!(rules.len(), 2);

        let mut txs = vec![tx("AMAZON EU SARL", "")];
        categorize_all(&mut txs, &rules);
        assert_eq!(txs[0].category.as_deref(), Some("Expenses:Shopping"));
    }
}

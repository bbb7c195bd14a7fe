use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use csv::StringRecord;
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use csv2qif_core::{Money, SecurityTrade, TradeAction, Transaction};

use crate::profile::{BankProfile, ProfileError};
use crate::util::{normalize_decimal, read_latin1, sanitize, sanitize_lower};

pub use crate::profile::ExtractorKind;

/// The ledger's base currency. Anything else is flagged, not
/// converted.
const BASE_CURRENCY: &str = "EUR";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("{file}: cannot parse date '{value}'")]
    Date { file: PathBuf, value: String },
    #[error("{file}: cannot parse amount '{value}'")]
    Amount { file: PathBuf, value: String },
    #[error("{file}: row is missing column {column}")]
    ShortRow { file: PathBuf, column: usize },
}

/// Extracts the canonical transactions from one identified file.
///
/// Dispatch is a closed match over the profile's extractor kind; the
/// profile store already rejected unknown identifiers, so every
/// loaded profile lands in exactly one arm.
pub fn extract(path: &Path, profile: &BankProfile) -> Result<Vec<Transaction>, ExtractError> {
    tracing::debug!(file = %path.display(), profile = %profile.name, "extracting");
    match profile.extractor {
        ExtractorKind::RabobankChecking => rabobank_checking(path, profile),
        ExtractorKind::IngChecking => ing_checking(path, profile),
        ExtractorKind::DegiroTransactions => degiro_transactions(path, profile),
        ExtractorKind::DegiroAccount => degiro_account(path, profile),
        ExtractorKind::RabobankInvestment => rabobank_investment(path, profile),
    }
}

// ── shared toolkit ────────────────────────────────────────────────────────

fn rows(content: &str, profile: &BankProfile) -> Result<Vec<StringRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(profile.delimiter)
        .quote(profile.quote)
        .from_reader(content.as_bytes());
    reader.records().collect()
}

fn field<'a>(row: &'a StringRecord, col: usize, path: &Path) -> Result<&'a str, ExtractError> {
    row.get(col).ok_or_else(|| ExtractError::ShortRow {
        file: path.to_path_buf(),
        column: col,
    })
}

/// Tries the profile's primary date format, then the secondary one if
/// declared. An unparsable date means the file does not really match
/// the claimed profile and is fatal.
fn parse_date(raw: &str, profile: &BankProfile, path: &Path) -> Result<NaiveDate, ExtractError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, &profile.date_format)
        .or_else(|e| match &profile.date_format_alt {
            Some(alt) => NaiveDate::parse_from_str(raw, alt).map_err(|_| e),
            None => Err(e),
        })
        .map_err(|_| ExtractError::Date {
            file: path.to_path_buf(),
            value: raw.to_string(),
        })
}

fn parse_decimal(raw: &str, path: &Path) -> Result<Decimal, ExtractError> {
    normalize_decimal(raw)
        .parse()
        .map_err(|_| ExtractError::Amount {
            file: path.to_path_buf(),
            value: raw.to_string(),
        })
}

fn parse_amount(raw: &str, path: &Path) -> Result<Money, ExtractError> {
    parse_decimal(raw, path).map(Money::from_decimal)
}

fn warn_foreign_currency(currency: &str, path: &Path, date: NaiveDate) {
    if !currency.is_empty() && currency != BASE_CURRENCY {
        tracing::warn!(
            file = %path.display(),
            %currency,
            %date,
            "transaction is not in {BASE_CURRENCY}; amounts are not converted"
        );
    }
}

// ── Rabobank checking ─────────────────────────────────────────────────────

// Rabobank investment accounts are 8 digits starting with 3.
static TRADE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(koop|verkoop) internet.*(3[0-9]{7})").unwrap());

/// Decimal-comma cash export with explicit counter-IBAN and payee
/// columns. A security buy/sell booked against the linked investment
/// account only mentions that account inside the memo text, so the
/// memo is scanned for the 8-digit investment account number to
/// recover the counter side.
fn rabobank_checking(path: &Path, profile: &BankProfile) -> Result<Vec<Transaction>, ExtractError> {
    let date_c = profile.column("COL_DATE")?;
    let iban_c = profile.column("COL_IBAN")?;
    let amount_c = profile.column("COL_AMOUNT")?;
    let balance_c = profile.column("COL_BALANCE")?;
    let memo_c = profile.column("COL_MEMO")?;
    let to_iban_c = profile.column("COL_IBANPAYEE")?;
    let payee_c = profile.column("COL_NAMEPAYEE")?;
    let sequence_c = profile.column("COL_SEQUENCE")?;

    let content = read_latin1(path)?;
    let mut transactions = Vec::new();

    for row in rows(&content, profile)?.iter().skip(profile.skip_headers) {
        let date = parse_date(field(row, date_c, path)?, profile, path)?;
        let amount = parse_amount(field(row, amount_c, path)?, path)?;
        let balance = parse_amount(field(row, balance_c, path)?, path)?;
        let memo = sanitize(field(row, memo_c, path)?);

        let mut counter_id = sanitize_lower(field(row, to_iban_c, path)?);
        if let Some(caps) = TRADE_LINK.captures(&memo.to_lowercase()) {
            counter_id = caps[2].to_string();
        }

        transactions.push(Transaction {
            counter_id,
            sequence: field(row, sequence_c, path)?.to_string(),
            payee: sanitize(field(row, payee_c, path)?),
            memo,
            balance: Some(balance),
            ..Transaction::cash(date, &sanitize_lower(field(row, iban_c, path)?), amount)
        });
    }

    Ok(transactions)
}

// ── ING checking ──────────────────────────────────────────────────────────

/// ING encodes direction in a separate flag column ("Af" = debit,
/// "Bij" = credit) instead of a signed amount, and splits the
/// description over two memo columns.
fn ing_checking(path: &Path, profile: &BankProfile) -> Result<Vec<Transaction>, ExtractError> {
    let date_c = profile.column("COL_DATE")?;
    let iban_c = profile.column("COL_IBAN")?;
    let amount_c = profile.column("COL_AMOUNT")?;
    let sign_c = profile.column("COL_SIGN")?;
    let balance_c = profile.column("COL_BALANCE")?;
    let memo1_c = profile.column("COL_MEMO1")?;
    let memo2_c = profile.column("COL_MEMO2")?;
    let to_iban_c = profile.column("COL_IBANPAYEE")?;
    let payee_c = profile.column("COL_NAMEPAYEE")?;

    let content = read_latin1(path)?;
    let mut transactions = Vec::new();

    for row in rows(&content, profile)?.iter().skip(profile.skip_headers) {
        let date = parse_date(field(row, date_c, path)?, profile, path)?;
        let mut amount = parse_amount(field(row, amount_c, path)?, path)?;
        if sanitize_lower(field(row, sign_c, path)?) == "af" {
            amount = -amount;
        }
        let balance = parse_amount(field(row, balance_c, path)?, path)?;

        let memo1 = sanitize(field(row, memo1_c, path)?);
        let memo2 = sanitize(field(row, memo2_c, path)?);

        transactions.push(Transaction {
            counter_id: sanitize_lower(field(row, to_iban_c, path)?),
            payee: sanitize(field(row, payee_c, path)?),
            memo: format!("{memo1}|{memo2}"),
            balance: Some(balance),
            ..Transaction::cash(date, &sanitize_lower(field(row, iban_c, path)?), amount)
        });
    }

    Ok(transactions)
}

// ── DeGiro transactions ───────────────────────────────────────────────────

/// The DeGiro transactions export holds security buys and sells only;
/// dividends and fees arrive through the account export. The source
/// account id is not in the file at all and comes from the profile's
/// `CHECKINGACCOUNT` setting.
fn degiro_transactions(path: &Path, profile: &BankProfile) -> Result<Vec<Transaction>, ExtractError> {
    let date_c = profile.column("COL_DATE")?;
    let memo_c = profile.column("COL_MEMO")?;
    let sequence_c = profile.column("COL_ORDERID")?;
    let isin_c = profile.column("COL_ISIN")?;
    let market_c = profile.column("COL_STOCKMARKET")?;
    let price_c = profile.column("COL_PRICE")?;
    let quantity_c = profile.column("COL_QUANTITY")?;
    let amount_c = profile.column("COL_AMOUNT")?;
    let commission_c = profile.column("COL_COMMISSION")?;
    let total_c = profile.column("COL_TOTAL")?;
    let currency_cols = [
        profile.column("COL_PRICECURRENCY")?,
        profile.column("COL_LOCALCURRENCY")?,
        profile.column("COL_AMOUNTCURRENCY")?,
        profile.column("COL_COMMISSIONCURRENCY")?,
        profile.column("COL_TOTALCURRENCY")?,
    ];

    let account_id = sanitize_lower(profile.setting("CHECKINGACCOUNT")?);

    let content = read_latin1(path)?;
    let mut transactions = Vec::new();

    for row in rows(&content, profile)?.iter().skip(profile.skip_headers) {
        let date = parse_date(field(row, date_c, path)?, profile, path)?;

        // A positive local value means shares left the account.
        let local_value = parse_amount(field(row, amount_c, path)?, path)?;
        let action = if local_value.is_sign_positive() {
            TradeAction::Sell
        } else {
            TradeAction::Buy
        };

        for &col in &currency_cols {
            warn_foreign_currency(field(row, col, path)?.trim(), path, date);
        }

        // The total column is positive for a buy; the cash leg it
        // represents decreases the account, so the sign flips.
        let amount = -parse_amount(field(row, total_c, path)?, path)?;
        let commission_raw = field(row, commission_c, path)?.trim();
        let commission = if commission_raw.is_empty() {
            Money::zero()
        } else {
            -parse_amount(commission_raw, path)?
        };

        let sequence = field(row, sequence_c, path)?.to_string();
        let memo = format!(
            "{} @ {} SEQ:{}",
            sanitize(field(row, memo_c, path)?),
            sanitize(field(row, market_c, path)?),
            sequence
        );

        let trade = SecurityTrade {
            security: sanitize(field(row, isin_c, path)?),
            price: parse_decimal(field(row, price_c, path)?, path)?,
            quantity: parse_decimal(field(row, quantity_c, path)?, path)?,
            commission,
            action,
        };

        transactions.push(Transaction {
            sequence,
            memo,
            ..Transaction::security_trade(date, &account_id, amount, trade)
        });
    }

    Ok(transactions)
}

// ── DeGiro account ────────────────────────────────────────────────────────

/// Memo patterns that mark the cash movements the transactions export
/// does not carry (fees, dividends, money-market compensation, FX
/// booking legs). Everything else in the account export duplicates
/// rows already extracted elsewhere and is skipped.
static DEGIRO_CASH_MEMO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "Aansluitingskosten\
        |Corporate Action Kosten\
        |Geldmarktfondsen Compensatie\
        |(Koersverandering|Conversie) geldmarktfonds\
        |Dividend\
        |Valuta (Creditering|Debitering)",
    )
    .unwrap()
});

fn degiro_account(path: &Path, profile: &BankProfile) -> Result<Vec<Transaction>, ExtractError> {
    let date_c = profile.column("COL_DATE")?;
    let memo_c = profile.column("COL_MEMO")?;
    let amount_c = profile.column("COL_AMOUNT")?;
    let currency_c = profile.column("COL_CURRENCY")?;
    let balance_c = profile.column("COL_BALANCE")?;

    let account_id = sanitize_lower(profile.setting("CHECKINGACCOUNT")?);

    let content = read_latin1(path)?;
    let mut transactions = Vec::new();

    for row in rows(&content, profile)?.iter().skip(profile.skip_headers) {
        // Non-EUR rows have a matching EUR booking leg elsewhere in
        // the same file; zero-amount rows are position updates.
        if field(row, currency_c, path)?.trim() != BASE_CURRENCY {
            continue;
        }
        let amount = parse_amount(field(row, amount_c, path)?, path)?;
        if amount.is_zero() {
            continue;
        }
        let memo = sanitize(field(row, memo_c, path)?);
        if !DEGIRO_CASH_MEMO.is_match(&memo) {
            continue;
        }

        let balance = parse_amount(field(row, balance_c, path)?, path)?;
        let date = parse_date(field(row, date_c, path)?, profile, path)?;

        transactions.push(Transaction {
            payee: "DeGiro".to_string(),
            memo,
            balance: Some(balance),
            ..Transaction::cash(date, &account_id, amount)
        });
    }

    Ok(transactions)
}

// ── Rabobank investment ───────────────────────────────────────────────────

/// Right-pads every row to the widest row's field count. The
/// investment export truncates trailing empty columns, and the
/// fixed-index column access below assumes rectangular data.
fn pad_to_rectangular(records: Vec<StringRecord>) -> Vec<StringRecord> {
    let width = records.iter().map(StringRecord::len).max().unwrap_or(0);
    records
        .into_iter()
        .map(|row| {
            let mut padded: Vec<&str> = row.iter().collect();
            padded.resize(width, "");
            StringRecord::from(padded)
        })
        .collect()
}

/// Security buys and sells from the Rabobank investment account. Cash
/// effects (dividends, fees) already appear in the linked checking
/// account export and are skipped here; only rows whose memo marks an
/// order execution are trades.
fn rabobank_investment(path: &Path, profile: &BankProfile) -> Result<Vec<Transaction>, ExtractError> {
    let date_c = profile.column("COL_DATE")?;
    let iban_c = profile.column("COL_IBAN")?;
    let memo_c = profile.column("COL_MEMO")?;
    let order_c = profile.column("COL_SHARENAME")?;
    let isin_c = profile.column("COL_ISIN")?;
    let quantity_c = profile.column("COL_QUANTITY")?;
    let price_c = profile.column("COL_PRICE")?;
    let amount_c = profile.column("COL_AMOUNT")?;
    let total_c = profile.column("COL_TOTAL")?;

    let content = read_latin1(path)?;
    let records = pad_to_rectangular(rows(&content, profile)?);

    let mut transactions = Vec::new();

    for row in records.iter().skip(profile.skip_headers) {
        let memo = sanitize(field(row, memo_c, path)?);
        let memo_lower = memo.to_lowercase();

        // "verkoop internet" contains "koop internet"; test it first.
        let action = if memo_lower.contains("verkoop internet") {
            TradeAction::Sell
        } else if memo_lower.contains("koop internet") {
            TradeAction::Buy
        } else {
            continue;
        };

        let date = parse_date(field(row, date_c, path)?, profile, path)?;
        let total = parse_amount(field(row, total_c, path)?, path)?;
        let gross = parse_amount(field(row, amount_c, path)?, path)?;
        let price = parse_decimal(field(row, price_c, path)?, path)?;
        let mut quantity = parse_decimal(field(row, quantity_c, path)?, path)?;

        // The export does not state the commission; it is the gap
        // between the order value and the settled total.
        let commission = (total.abs() - gross.abs()).abs().round();

        let security = sanitize(field(row, isin_c, path)?);
        // Rabobank certificates are quoted against a nominal value of
        // EUR 100 but exported in EUR 1 units.
        if security == "XS1002121454" {
            quantity = (quantity / Decimal::from(100)).trunc();
        }

        let trade = SecurityTrade {
            security,
            price,
            quantity,
            commission,
            action,
        };

        transactions.push(Transaction {
            memo: format!("{memo} @ {}", sanitize(field(row, order_c, path)?)),
            ..Transaction::security_trade(
                date,
                &sanitize_lower(field(row, iban_c, path)?),
                -total,
                trade,
            )
        });
    }

    Ok(transactions)
}

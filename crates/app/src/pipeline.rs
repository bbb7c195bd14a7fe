use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use csv2qif_export::QifWriter;
use csv2qif_import as import;

/// Runs the whole conversion: identify each input, extract, resolve,
/// categorize, resolve again, deduplicate, write the QIF file.
///
/// Every stage runs to completion over the whole transaction set
/// before the next begins. Any error aborts before the output file is
/// written.
pub fn run(inputs: &[PathBuf], config_dir: &Path, output: &Path) -> Result<()> {
    let profiles = import::load_profiles(&config_dir.join("banks"))
        .context("failed to load bank profiles")?;
    let registry = import::load_accounts(&config_dir.join("bankaccounts.def"))
        .context("failed to load account definitions")?;
    let rules = import::load_rules(&config_dir.join("categories.csv"))
        .context("failed to load category rules")?;

    let mut transactions = Vec::new();
    for input in inputs {
        let profile = import::identify(input, &profiles)?;
        tracing::info!(file = %input.display(), profile = %profile.name, "identified input");
        let extracted = import::extract(input, profile)?;
        tracing::info!(file = %input.display(), count = extracted.len(), "extracted transactions");
        transactions.extend(extracted);
    }

    import::resolve_account_names(&registry, &mut transactions)?;
    import::categorize_all(&mut transactions, &rules);
    // A category can itself name a ledger account; the second pass
    // back-fills those counter sides before deduplication.
    import::resolve_account_names(&registry, &mut transactions)?;

    let (kept, stats) = import::suppress_transfer_echoes(transactions, &registry);

    for tx in import::uncategorized(&kept) {
        tracing::info!(account = %tx.account_id, memo = %tx.memo, "transaction without category");
    }

    let mut qif = QifWriter::new();
    for account in registry.iter() {
        qif.add_account(&account.name, &account.kind);
    }
    for tx in kept {
        let account_name = tx.account_name.clone();
        qif.append(&account_name, tx)?;
    }
    qif.write_to(output)?;

    tracing::info!(
        converted = stats.total - stats.suppressed,
        suppressed = stats.suppressed,
        uncategorized = stats.uncategorized,
        output = %output.display(),
        "conversion complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RABO_DEF: &str = "\
DELIMITER ,
QUOTECHAR \"
SKIPHEADERS 1
ROW_FINGERPRINT 0
COL_FINGERPRINT 0
FINGERPRINTREGEX ^IBAN/BBAN$
CSVPARSER rabobank-checking
DATEFORMAT1 %Y-%m-%d
COL_DATE 1
COL_IBAN 0
COL_AMOUNT 2
COL_BALANCE 3
COL_IBANPAYEE 4
COL_NAMEPAYEE 5
COL_MEMO 6
COL_SEQUENCE 7
";

    const ING_DEF: &str = "\
DELIMITER ;
QUOTECHAR \"
SKIPHEADERS 1
ROW_FINGERPRINT 0
COL_FINGERPRINT 1
FINGERPRINTREGEX ^Naam / Omschrijving$
CSVPARSER ing-checking
DATEFORMAT1 %Y%m%d
COL_DATE 0
COL_NAMEPAYEE 1
COL_IBAN 2
COL_IBANPAYEE 3
COL_SIGN 4
COL_AMOUNT 5
COL_MEMO1 6
COL_MEMO2 7
COL_BALANCE 8
";

    /// Writes a config dir with one Rabobank and one ING profile, two
    /// ledger accounts (Checking has the better priority rank) and a
    /// single Amazon rule.
    fn write_config(dir: &Path) {
        let banks = dir.join("banks");
        std::fs::create_dir_all(&banks).unwrap();
        std::fs::write(banks.join("rabobank.def"), RABO_DEF).unwrap();
        std::fs::write(banks.join("ing.def"), ING_DEF).unwrap();
        std::fs::write(
            dir.join("bankaccounts.def"),
            "NL11RABO0123456789 | Assets:Checking | Bank\n\
             NL22INGB0987654321 | Assets:Savings | Bank\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("categories.csv"),
            "payee,category,payee-regex,memo-regex\n\
             Amazon,Expenses:Shopping,^amazon.*,\n",
        )
        .unwrap();
    }

    #[test]
    fn transfer_echo_keeps_only_the_checking_leg() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        // Leg 1, exported from Checking: 100 to Savings.
        let rabo = dir.path().join("rabo.csv");
        std::fs::write(
            &rabo,
            "IBAN/BBAN,Datum,Bedrag,Saldo,Tegenrekening,Naam,Omschrijving,Volgnr\n\
             NL11RABO0123456789,2024-01-15,\"-100,00\",\"900,00\",NL22INGB0987654321,Eigen rekening,maandelijks sparen,1\n",
        )
        .unwrap();

        // Leg 2, exported from Savings: the same transfer seen from
        // the other side.
        let ing = dir.path().join("ing.csv");
        std::fs::write(
            &ing,
            "Datum;Naam / Omschrijving;Rekening;Tegenrekening;Af Bij;Bedrag;Mutatiesoort;Mededelingen;Saldo\n\
             20240115;Eigen rekening;NL22INGB0987654321;NL11RABO0123456789;Bij;100,00;Overschrijving;maandelijks sparen;1100,00\n",
        )
        .unwrap();

        let output = dir.path().join("out.qif");
        run(&[rabo, ing], dir.path(), &output).unwrap();

        let qif = std::fs::read_to_string(&output).unwrap();
        // Exactly one leg survives: the one from the higher-priority
        // Checking account.
        assert_eq!(qif.matches("L[Assets:Savings]").count(), 1);
        assert_eq!(qif.matches("L[Assets:Checking]").count(), 0);
        assert!(qif.contains("T-100.00\n"));
    }

    #[test]
    fn transfer_outcome_is_the_same_in_reverse_input_order() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        let rabo = dir.path().join("rabo.csv");
        std::fs::write(
            &rabo,
            "IBAN/BBAN,Datum,Bedrag,Saldo,Tegenrekening,Naam,Omschrijving,Volgnr\n\
             NL11RABO0123456789,2024-01-15,\"-100,00\",\"900,00\",NL22INGB0987654321,Eigen rekening,maandelijks sparen,1\n",
        )
        .unwrap();
        let ing = dir.path().join("ing.csv");
        std::fs::write(
            &ing,
            "Datum;Naam / Omschrijving;Rekening;Tegenrekening;Af Bij;Bedrag;Mutatiesoort;Mededelingen;Saldo\n\
             20240115;Eigen rekening;NL22INGB0987654321;NL11RABO0123456789;Bij;100,00;Overschrijving;maandelijks sparen;1100,00\n",
        )
        .unwrap();

        let output = dir.path().join("out.qif");
        run(&[ing, rabo], dir.path(), &output).unwrap();

        let qif = std::fs::read_to_string(&output).unwrap();
        assert_eq!(qif.matches("L[Assets:Savings]").count(), 1);
        assert_eq!(qif.matches("L[Assets:Checking]").count(), 0);
    }

    #[test]
    fn payee_rule_categorizes_and_preserves_original_payee_in_memo() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        let rabo = dir.path().join("rabo.csv");
        std::fs::write(
            &rabo,
            "IBAN/BBAN,Datum,Bedrag,Saldo,Tegenrekening,Naam,Omschrijving,Volgnr\n\
             NL11RABO0123456789,2024-01-16,\"-49,90\",\"850,10\",,AMAZON EU SARL,order 123-456,2\n",
        )
        .unwrap();

        let output = dir.path().join("out.qif");
        run(&[rabo], dir.path(), &output).unwrap();

        let qif = std::fs::read_to_string(&output).unwrap();
        assert!(qif.contains("PAmazon\n"));
        assert!(qif.contains("LExpenses:Shopping\n"));
        assert!(qif.contains("MAMAZON EU SARL||order 123-456\n"));
    }

    #[test]
    fn unknown_source_account_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        let rabo = dir.path().join("rabo.csv");
        std::fs::write(
            &rabo,
            "IBAN/BBAN,Datum,Bedrag,Saldo,Tegenrekening,Naam,Omschrijving,Volgnr\n\
             NL99BANK0000000000,2024-01-15,\"-1,00\",\"0,00\",,x,y,1\n",
        )
        .unwrap();

        let output = dir.path().join("out.qif");
        assert!(run(&[rabo], dir.path(), &output).is_err());
        assert!(!output.exists(), "no partial output on a fatal error");
    }

    #[test]
    fn unrecognized_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());

        let unknown = dir.path().join("unknown.csv");
        std::fs::write(&unknown, "Date,Amount\n2024-01-15,1.00\n").unwrap();

        let output = dir.path().join("out.qif");
        assert!(run(&[unknown], dir.path(), &output).is_err());
        assert!(!output.exists());
    }
}

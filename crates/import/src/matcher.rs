use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::profile::BankProfile;
use crate::util::read_latin1;

#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}: file does not match any bank profile")]
    NoMatch(PathBuf),
    #[error("{file}: file matches multiple bank profiles ({}); fingerprints must be mutually exclusive", profiles.join(", "))]
    Ambiguous {
        file: PathBuf,
        profiles: Vec<String>,
    },
}

/// Determines which single profile produced `path` by matching each
/// profile's fingerprint regex against its designated cell.
///
/// Zero matching profiles and more than one matching profile are both
/// hard errors; an ambiguous match means the profile set itself is
/// broken and is reported, never silently resolved.
pub fn identify<'a>(
    path: &Path,
    profiles: &'a [BankProfile],
) -> Result<&'a BankProfile, IdentifyError> {
    let content = read_latin1(path)?;
    let mut matches: Vec<&BankProfile> = Vec::new();

    for profile in profiles {
        if fingerprint_matches(&content, profile) {
            tracing::debug!(file = %path.display(), profile = %profile.name, "fingerprint match");
            matches.push(profile);
        }
    }

    match matches.as_slice() {
        [] => Err(IdentifyError::NoMatch(path.to_path_buf())),
        [profile] => Ok(profile),
        many => Err(IdentifyError::Ambiguous {
            file: path.to_path_buf(),
            profiles: many.iter().map(|p| p.name.clone()).collect(),
        }),
    }
}

/// Reads the candidate file with this profile's delimiter/quote and
/// tests the fingerprint cell. A file shorter than the fingerprint
/// row, or a row shorter than the fingerprint column, is simply not a
/// match for this profile.
fn fingerprint_matches(content: &str, profile: &BankProfile) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(profile.delimiter)
        .quote(profile.quote)
        .from_reader(content.as_bytes());

    let Some(Ok(row)) = reader.records().nth(profile.fingerprint_row) else {
        return false;
    };

    row.get(profile.fingerprint_col)
        .is_some_and(|cell| profile.fingerprint.is_match(cell))
}

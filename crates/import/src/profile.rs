use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use csv2qif_core::{AccountRegistry, RegistryError};

use crate::util::{read_latin1, sanitize, sanitize_lower};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file}: line '{line}' is not a 'key value' pair")]
    MalformedLine { file: PathBuf, line: String },
    #[error("{file}: missing required key {key}")]
    MissingKey { file: PathBuf, key: String },
    #[error("{file}: key {key} has invalid value '{value}'")]
    InvalidValue {
        file: PathBuf,
        key: String,
        value: String,
    },
    #[error("{file}: bad fingerprint regex: {source}")]
    BadFingerprint {
        file: PathBuf,
        source: regex::Error,
    },
    #[error("{file}: unknown extractor '{name}'")]
    UnknownExtractor { file: PathBuf, name: String },
    #[error("{file}: line '{line}' is not an 'id | ledger name | type' triple")]
    MalformedAccountLine { file: PathBuf, line: String },
    #[error("{file}: {source}")]
    Registry {
        file: PathBuf,
        source: RegistryError,
    },
}

/// The closed set of supported per-institution extractors. A profile
/// names one of these in its `CSVPARSER` key; an unknown identifier
/// fails at load time, before any input file is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorKind {
    RabobankChecking,
    IngChecking,
    DegiroTransactions,
    DegiroAccount,
    RabobankInvestment,
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rabobank-checking" => Ok(ExtractorKind::RabobankChecking),
            "ing-checking" => Ok(ExtractorKind::IngChecking),
            "degiro-transactions" => Ok(ExtractorKind::DegiroTransactions),
            "degiro-account" => Ok(ExtractorKind::DegiroAccount),
            "rabobank-investment" => Ok(ExtractorKind::RabobankInvestment),
            other => Err(format!("unknown extractor: '{other}'")),
        }
    }
}

/// One institution/account-type's declarative CSV layout, loaded from
/// a `banks/*.def` file. Immutable once loaded.
///
/// The common settings every profile must declare are typed fields;
/// the instance-specific `COL_*` indices stay in the raw key/value
/// map and are pulled by the matching extractor through [`column`]
/// and [`setting`].
///
/// [`column`]: BankProfile::column
/// [`setting`]: BankProfile::setting
#[derive(Debug, Clone)]
pub struct BankProfile {
    /// Definition file this profile was loaded from; identifies the
    /// profile in logs and errors.
    pub source: PathBuf,
    pub name: String,
    pub delimiter: u8,
    pub quote: u8,
    pub skip_headers: usize,
    pub fingerprint_row: usize,
    pub fingerprint_col: usize,
    pub fingerprint: Regex,
    pub extractor: ExtractorKind,
    pub date_format: String,
    pub date_format_alt: Option<String>,
    settings: HashMap<String, String>,
}

impl BankProfile {
    /// Looks up a column index key (`COL_DATE`, `COL_AMOUNT`, ...).
    pub fn column(&self, key: &str) -> Result<usize, ProfileError> {
        let raw = self.setting(key)?;
        raw.parse().map_err(|_| ProfileError::InvalidValue {
            file: self.source.clone(),
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn setting(&self, key: &str) -> Result<&str, ProfileError> {
        self.settings
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ProfileError::MissingKey {
                file: self.source.clone(),
                key: key.to_string(),
            })
    }

    fn from_map(source: &Path, settings: HashMap<String, String>) -> Result<Self, ProfileError> {
        let get = |key: &str| -> Result<&str, ProfileError> {
            settings
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| ProfileError::MissingKey {
                    file: source.to_path_buf(),
                    key: key.to_string(),
                })
        };
        let get_usize = |key: &str| -> Result<usize, ProfileError> {
            let raw = get(key)?;
            raw.parse().map_err(|_| ProfileError::InvalidValue {
                file: source.to_path_buf(),
                key: key.to_string(),
                value: raw.to_string(),
            })
        };
        let get_byte = |key: &str| -> Result<u8, ProfileError> {
            let raw = get(key)?;
            match raw.as_bytes() {
                [b] => Ok(*b),
                _ => Err(ProfileError::InvalidValue {
                    file: source.to_path_buf(),
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
            }
        };

        // Match semantics: the pattern applies from the start of the
        // fingerprint cell, like the rule patterns in rules.rs.
        let fingerprint = Regex::new(&format!("^(?:{})", get("FINGERPRINTREGEX")?)).map_err(|e| {
            ProfileError::BadFingerprint {
                file: source.to_path_buf(),
                source: e,
            }
        })?;

        let extractor_name = get("CSVPARSER")?;
        let extractor =
            extractor_name
                .parse()
                .map_err(|_| ProfileError::UnknownExtractor {
                    file: source.to_path_buf(),
                    name: extractor_name.to_string(),
                })?;

        let name = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());

        Ok(BankProfile {
            source: source.to_path_buf(),
            name,
            delimiter: get_byte("DELIMITER")?,
            quote: get_byte("QUOTECHAR")?,
            skip_headers: get_usize("SKIPHEADERS")?,
            fingerprint_row: get_usize("ROW_FINGERPRINT")?,
            fingerprint_col: get_usize("COL_FINGERPRINT")?,
            fingerprint,
            extractor,
            date_format: get("DATEFORMAT1")?.to_string(),
            date_format_alt: settings.get("DATEFORMAT2").cloned(),
            settings,
        })
    }
}

/// Parses a line-oriented definition file into key/value pairs.
/// `#` starts a comment, blank lines are skipped, the first
/// whitespace run splits key from value.
fn read_definition_file(path: &Path) -> Result<HashMap<String, String>, ProfileError> {
    let content = read_latin1(path)?;
    let mut map = HashMap::new();

    for raw in content.lines() {
        let line = sanitize(raw);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(' ') {
            Some((key, value)) => {
                map.insert(key.to_string(), value.to_string());
            }
            None => {
                return Err(ProfileError::MalformedLine {
                    file: path.to_path_buf(),
                    line,
                })
            }
        }
    }

    Ok(map)
}

/// Loads every `*.def` profile under `dir`, sorted by file name so a
/// run is deterministic regardless of directory iteration order.
pub fn load_profiles(dir: &Path) -> Result<Vec<BankProfile>, ProfileError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "def"))
        .collect();
    paths.sort();

    let mut profiles = Vec::with_capacity(paths.len());
    for path in &paths {
        let settings = read_definition_file(path)?;
        profiles.push(BankProfile::from_map(path, settings)?);
    }

    tracing::debug!(count = profiles.len(), dir = %dir.display(), "loaded bank profiles");
    Ok(profiles)
}

/// Loads the ledger-account declarations: one
/// `external-id | ledger name | type` triple per line, priority rank
/// assigned in declaration order.
pub fn load_accounts(path: &Path) -> Result<AccountRegistry, ProfileError> {
    let content = read_latin1(path)?;
    let mut registry = AccountRegistry::new();

    for raw in content.lines() {
        let line = sanitize(raw);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('|').collect();
        let [id, name, kind] = fields.as_slice() else {
            return Err(ProfileError::MalformedAccountLine {
                file: path.to_path_buf(),
                line,
            });
        };

        registry
            .insert(&sanitize_lower(id), &sanitize(name), &sanitize(kind))
            .map_err(|e| ProfileError::Registry {
                file: path.to_path_buf(),
                source: e,
            })?;
    }

    Ok(registry)
}

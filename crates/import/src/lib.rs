pub mod dedup;
pub mod extract;
pub mod matcher;
pub mod profile;
pub mod resolve;
pub mod rules;
pub(crate) mod util;

pub use dedup::{suppress_transfer_echoes, uncategorized, MergeStats};
pub use extract::{extract, ExtractError, ExtractorKind};
pub use matcher::{identify, IdentifyError};
pub use profile::{load_accounts, load_profiles, BankProfile, ProfileError};
pub use resolve::{resolve_account_names, ResolveError};
pub use rules::{categorize_all, load_rules, CategoryRule, RuleError, RuleSet};

/// Trims the string and collapses internal whitespace runs to a
/// single space.
pub fn sanitize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `sanitize` plus lowercasing; account identifiers are compared
/// case-insensitively, so they are stored folded.
pub fn sanitize_lower(s: &str) -> String {
    sanitize(s).to_lowercase()
}

/// Repairs decimal-comma notation to decimal-point notation:
/// `25.400,05` becomes `25400.05`. When a comma is present, every dot
/// is a thousands separator and is dropped; without a comma the
/// string is assumed to already use a decimal point. Afterwards every
/// character that is not a digit, dot or minus is stripped (Rabobank
/// certificate rows append `%` to amounts).
///
/// Idempotent: feeding the output back in returns it unchanged.
pub fn normalize_decimal(amount: &str) -> String {
    let mut repaired = String::with_capacity(amount.len());
    let has_comma = amount.contains(',');

    for c in amount.chars() {
        match c {
            ',' => repaired.push('.'),
            '.' if has_comma => {}
            c if c.is_ascii_digit() || c == '.' || c == '-' => repaired.push(c),
            _ => {}
        }
    }

    repaired
}

/// Decodes a Latin-1 byte stream; institution exports predate UTF-8.
/// Every Latin-1 byte maps 1-to-1 onto the same Unicode scalar.
pub fn read_latin1(path: &std::path::Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}

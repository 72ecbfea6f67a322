use sha2::Digest;
use sha2::Sha256;

/// Hex encoded SHA-256 of the input string.
pub fn calculate_checksum(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex encoded SHA-256 over a sequence of strings.
pub fn calculate_strings_checksum<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Parses a byte size such as `12M`, `512k`, `1g` or `4096`.
///
/// Suffixes are binary multiples (`K` = 1024). Returns `None` for anything
/// else, including overflow.
pub fn parse_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (digits, multiplier) = match trimmed.as_bytes()[trimmed.len() - 1].to_ascii_lowercase() {
        b'k' => (&trimmed[..trimmed.len() - 1], 1024u64),
        b'm' => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        b'g' => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        _ => (trimmed, 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

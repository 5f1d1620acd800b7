//! Address validation.

/// Loose syntactic check: one `@`, a non-empty local part, a dotted domain
/// with non-empty labels, no whitespace.
pub fn is_valid_address(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = address.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

/// Split raw cells into (valid, rejected). Valid addresses are trimmed and
/// deduplicated case-insensitively, keeping first occurrence. Empty cells
/// are dropped.
pub fn partition_addresses<'a, I>(cells: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut valid: Vec<String> = Vec::new();
    let mut rejected = Vec::new();
    for cell in cells {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        if !is_valid_address(cell) {
            rejected.push(cell.to_string());
        } else if !valid.iter().any(|v| v.eq_ignore_ascii_case(cell)) {
            valid.push(cell.to_string());
        }
    }
    (valid, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert!(is_valid_address("ana@example.com"));
        assert!(is_valid_address("  bo.li@mail.school.edu.mx "));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("ana.example.com"));
        assert!(!is_valid_address("ana@localhost"));
        assert!(!is_valid_address("@example.com"));
        assert!(!is_valid_address("ana@@example.com"));
        assert!(!is_valid_address("ana@example."));
        assert!(!is_valid_address("ana maria@example.com"));
    }

    #[test]
    fn test_partition_dedup() {
        let (valid, rejected) = partition_addresses([
            "ana@example.com",
            "",
            "ANA@example.com",
            "not-an-address",
            "ana@school.edu",
        ]);
        assert_eq!(valid, vec!["ana@example.com", "ana@school.edu"]);
        assert_eq!(rejected, vec!["not-an-address"]);
    }
}

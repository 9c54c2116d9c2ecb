use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = relay_common::id::prefixed_ulid("sub");
/// assert!(id.starts_with("sub_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// One viewer's streaming subscription.
    pub const SUBSCRIBER: &str = "sub";
    /// One upstream connection attempt.
    pub const ATTEMPT: &str = "att";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid("sub");
        assert!(id.starts_with("sub_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid(prefix::SUBSCRIBER);
        let b = prefixed_ulid(prefix::SUBSCRIBER);
        assert_ne!(a, b);
    }
}

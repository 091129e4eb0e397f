//! Backend identity.

use std::fmt;
use std::io::Cursor;

/// Stable map key for a backend, derived from its URL.
///
/// First 64 bits of Murmur3 x64_128 (seed 0) over the URL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendKey(pub u64);

impl BackendKey {
    pub fn from_url(url: &str) -> Self {
        // reading from an in-memory cursor cannot fail
        let hash = murmur3::murmur3_x64_128(&mut Cursor::new(url.as_bytes()), 0).unwrap_or_default();
        BackendKey(hash as u64)
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_distinct() {
        let a = BackendKey::from_url("http://127.0.0.1:8080");
        let b = BackendKey::from_url("http://127.0.0.1:8081");
        assert_eq!(a, BackendKey::from_url("http://127.0.0.1:8080"));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("{:x}", a.0));
    }
}

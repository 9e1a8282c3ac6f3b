use crate::types::Result;

/// Recovers the full key a terminal value was inserted under.
///
/// Only consulted on collision paths: verifying a prefix-compacted entry or
/// redistributing it during a split.
pub trait KeyResolver {
    /// Returns the original key for `value`.
    fn resolve(&self, value: &[u8]) -> Result<Vec<u8>>;
}

impl<F> KeyResolver for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>>,
{
    fn resolve(&self, value: &[u8]) -> Result<Vec<u8>> {
        self(value)
    }
}

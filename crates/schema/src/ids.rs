//! Opaque identifier generation
//!
//! Identifiers are 128 bits from the operating system CSPRNG, hex encoded.
//! They double as unguessable handles, so the source must stay
//! cryptographically secure.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{SchemaError, SchemaResult};

/// Number of random bytes in an identifier
pub const ID_BYTES: usize = 16;

/// Source of opaque row identifiers
pub trait IdGenerator: Send + Sync {
    /// Produce a new identifier
    fn new_id(&self) -> SchemaResult<String>;
}

/// Generator backed by the operating system random source
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn new_id(&self) -> SchemaResult<String> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SchemaError::Entropy(format!("Failed to generate random ID: {}", e)))?;
        Ok(hex::encode(bytes))
    }
}

/// Generate an identifier with the default generator
pub fn new_id() -> SchemaResult<String> {
    RandomIdGenerator.new_id()
}

/// Check that a value has the shape of a generated identifier
pub fn is_opaque_id(value: &str) -> bool {
    value.len() == ID_BYTES * 2
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_id_shape() {
        let id = new_id().unwrap();
        assert_eq!(id.len(), 32);
        assert!(is_opaque_id(&id));
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn test_new_ids_are_distinct() {
        let generator = RandomIdGenerator::new();
        let ids: HashSet<String> = (0..1000).map(|_| generator.new_id().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_is_opaque_id_rejects_other_shapes() {
        assert!(!is_opaque_id("42"));
        assert!(!is_opaque_id("0123456789ABCDEF0123456789ABCDEF"));
        assert!(!is_opaque_id("0123456789abcdef0123456789abcdeg"));
        assert!(is_opaque_id("0123456789abcdef0123456789abcdef"));
    }
}

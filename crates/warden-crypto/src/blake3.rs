//! Domain-separated BLAKE3 hashing for the Warden protocol.
//!
//! Every hash that ends up on the ledger is computed in BLAKE3's key
//! derivation mode under a registered context string, so a share commitment
//! can never collide with a master-secret hash or a challenge hash even when
//! the inputs are identical.
//!
//! ## Modes
//!
//! - [`hash`] — Pure hashing: identity fingerprints, test fixtures
//! - [`derive_key`] — Context-bound hashing and key derivation for every ledger commitment
//!
//! Inputs made of several dynamic fields are framed with
//! [`encode_multi_field`] before hashing.

/// Registered BLAKE3 context strings.
/// Using an unregistered context string is a protocol violation.
pub mod contexts {
    /// Guardian share commitment: `index || share || guardian_pubkey`.
    pub const SHARE_COMMITMENT: &str = "Warden v1 share-commitment";
    /// Commitment to the master secret stored in the recovery config.
    pub const MASTER_SECRET_HASH: &str = "Warden v1 master-secret-hash";
    /// Hash of the recovery challenge plaintext.
    pub const CHALLENGE_HASH: &str = "Warden v1 challenge-hash";
    /// Key that seals the recovery challenge, derived from the master secret.
    pub const CHALLENGE_KEY: &str = "Warden v1 challenge-key";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[
        SHARE_COMMITMENT,
        MASTER_SECRET_HASH,
        CHALLENGE_HASH,
        CHALLENGE_KEY,
    ];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a key (or a context-bound digest) using BLAKE3's key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (must start with "Warden v1 ")
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Compare two digests in constant time.
///
/// `blake3::Hash` implements `PartialEq` with a constant-time comparison, so
/// both sides are lifted into it rather than compared as byte arrays.
pub fn ct_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    ::blake3::Hash::from(*a) == ::blake3::Hash::from(*b)
}

/// Verify that a context string is registered in the Warden protocol.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_context_strings_registered() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(
                ctx.starts_with("Warden v1 "),
                "Context string '{ctx}' has wrong prefix"
            );
        }
    }

    #[test]
    fn test_context_strings_unique() {
        let mut seen = std::collections::HashSet::new();
        for ctx in contexts::ALL_CONTEXTS {
            assert!(seen.insert(*ctx), "duplicate context {ctx}");
        }
    }

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"Warden test vector 1"), hash(b"Warden test vector 1"));
        assert_ne!(hash(b"input1"), hash(b"input2"));
    }

    #[test]
    fn test_derive_key_different_contexts() {
        let a = derive_key(contexts::MASTER_SECRET_HASH, &[0u8; 32]);
        let b = derive_key(contexts::CHALLENGE_HASH, &[0u8; 32]);
        assert_ne!(a, b);
        assert_ne!(a, hash(&[0u8; 32]));
    }

    #[test]
    fn test_ct_eq() {
        let a = hash(b"a");
        let b = hash(b"b");
        assert!(ct_eq(&a, &a));
        assert!(!ct_eq(&a, &b));
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[9..13], &5u32.to_le_bytes());
        assert_eq!(&encoded[13..18], b"world");
    }

    #[test]
    fn test_multi_field_framing_prevents_shifting() {
        let a = encode_multi_field(&[b"ab", b"c"]);
        let b = encode_multi_field(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_registered_context() {
        assert!(is_registered_context("Warden v1 share-commitment"));
        assert!(!is_registered_context("Warden v1 made-up-context"));
    }
}

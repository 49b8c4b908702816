//! Record key layout.
//!
//! ```text
//! recovery_config/<owner hex>
//! recovery_request/<owner hex>/<request id, 20 digits>
//! emergency_access/<owner hex>
//! ```
//!
//! Request ids are zero-padded so lexicographic order is numeric order.

use std::fmt;

use warden_types::{PublicKey, RequestId};

pub const RECOVERY_CONFIG_PREFIX: &str = "recovery_config/";
pub const RECOVERY_REQUEST_PREFIX: &str = "recovery_request/";
pub const EMERGENCY_ACCESS_PREFIX: &str = "emergency_access/";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn recovery_config(owner: &PublicKey) -> Self {
        Self(format!("{RECOVERY_CONFIG_PREFIX}{}", hex::encode(owner)))
    }

    pub fn recovery_request(owner: &PublicKey, request_id: RequestId) -> Self {
        Self(format!(
            "{}{request_id:020}",
            Self::recovery_requests_prefix(owner)
        ))
    }

    pub fn emergency_access(owner: &PublicKey) -> Self {
        Self(format!("{EMERGENCY_ACCESS_PREFIX}{}", hex::encode(owner)))
    }

    /// Prefix covering every request of one owner.
    pub fn recovery_requests_prefix(owner: &PublicKey) -> String {
        format!("{RECOVERY_REQUEST_PREFIX}{}/", hex::encode(owner))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let owner = [0xAB; 32];
        let hex_owner = "ab".repeat(32);

        assert_eq!(
            RecordKey::recovery_config(&owner).as_str(),
            format!("recovery_config/{hex_owner}")
        );
        assert_eq!(
            RecordKey::emergency_access(&owner).as_str(),
            format!("emergency_access/{hex_owner}")
        );
        assert_eq!(
            RecordKey::recovery_request(&owner, 7).as_str(),
            format!("recovery_request/{hex_owner}/00000000000000000007")
        );
    }

    #[test]
    fn test_request_keys_sort_numerically() {
        let owner = [0x01; 32];
        assert!(RecordKey::recovery_request(&owner, 9) < RecordKey::recovery_request(&owner, 10));
        assert!(
            RecordKey::recovery_request(&owner, 10) < RecordKey::recovery_request(&owner, u64::MAX)
        );
    }

    #[test]
    fn test_request_prefix_is_per_owner() {
        let a = RecordKey::recovery_request(&[0x01; 32], 1);
        assert!(a
            .as_str()
            .starts_with(&RecordKey::recovery_requests_prefix(&[0x01; 32])));
        assert!(!a
            .as_str()
            .starts_with(&RecordKey::recovery_requests_prefix(&[0x02; 32])));
    }
}

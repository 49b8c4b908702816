//! Versioned record envelope for ledger persistence.
//!
//! Every record the ledger stores is wrapped as `{ kind, version, body }` and
//! CBOR encoded (RFC 8949, integers big-endian). Decoding happens once, here:
//! the envelope is read first, its kind and version are checked against the
//! expected type, and only then is the body deserialized. Unknown kinds and
//! versions are rejected rather than guessed at.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Record families stored on the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    RecoveryConfig,
    RecoveryRequest,
    EmergencyAccess,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RecoveryConfig => "recovery_config",
            Self::RecoveryRequest => "recovery_request",
            Self::EmergencyAccess => "emergency_access",
        };
        f.write_str(name)
    }
}

/// A record type with a fixed kind and schema version.
pub trait Versioned: Serialize + DeserializeOwned {
    const KIND: RecordKind;
    const VERSION: u16;
}

/// Errors at the encode/decode boundary.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("CBOR encoding of {kind} failed: {reason}")]
    Encode { kind: RecordKind, reason: String },

    #[error("malformed record envelope: {0}")]
    Envelope(String),

    #[error("expected {expected} record, found {found}")]
    UnexpectedKind {
        expected: RecordKind,
        found: RecordKind,
    },

    #[error("unsupported {kind} schema version {version} (supported: {supported})")]
    UnsupportedVersion {
        kind: RecordKind,
        version: u16,
        supported: u16,
    },

    #[error("malformed {kind} body: {reason}")]
    Body { kind: RecordKind, reason: String },
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    kind: RecordKind,
    version: u16,
    body: T,
}

/// Wrap `record` in its envelope and CBOR encode it.
pub fn encode<T: Versioned>(record: &T) -> Result<Vec<u8>, SchemaError> {
    let envelope = Envelope {
        kind: T::KIND,
        version: T::VERSION,
        body: record,
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&envelope, &mut buf).map_err(|e| SchemaError::Encode {
        kind: T::KIND,
        reason: e.to_string(),
    })?;
    Ok(buf)
}

/// Decode a record, checking kind and version before touching the body.
pub fn decode<T: Versioned>(bytes: &[u8]) -> Result<T, SchemaError> {
    let envelope: Envelope<ciborium::Value> =
        ciborium::from_reader(bytes).map_err(|e| SchemaError::Envelope(e.to_string()))?;

    if envelope.kind != T::KIND {
        return Err(SchemaError::UnexpectedKind {
            expected: T::KIND,
            found: envelope.kind,
        });
    }
    if envelope.version != T::VERSION {
        return Err(SchemaError::UnsupportedVersion {
            kind: T::KIND,
            version: envelope.version,
            supported: T::VERSION,
        });
    }

    envelope.body.deserialized().map_err(|e| SchemaError::Body {
        kind: T::KIND,
        reason: e.to_string(),
    })
}

//! IPC command handlers.
//!
//! Byte parameters are hex strings. Each submodule implements the commands
//! for one record family.

pub mod emergency;
pub mod events;
pub mod recovery;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use warden_emergency::contacts::EmergencyContact;
use warden_emergency::monitor::EmergencyAccess;
use warden_guardian::recovery::RecoveryRequest;
use warden_guardian::registry::{GuardianRecord, RecoveryConfig};
use warden_types::{OwnershipTransfer, Timestamp, TransferReason};

use crate::rpc::RpcError;
use crate::DaemonState;

pub type Result = std::result::Result<Value, RpcError>;

/// Deserialize `params` into a handler's parameter struct.
pub(crate) fn parse<T: DeserializeOwned>(params: &Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

/// Enum as its serde name.
fn name<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn opt_hex(bytes: Option<&[u8]>) -> Value {
    bytes.map_or(Value::Null, |b| Value::String(hex::encode(b)))
}

pub(crate) fn guardian_json(guardian: &GuardianRecord) -> Value {
    serde_json::json!({
        "pubkey": hex::encode(guardian.pubkey),
        "nickname": opt_hex(guardian.nickname.as_deref()),
        "share_index": guardian.share_index,
        "share_commitment": hex::encode(guardian.share_commitment),
        "status": name(&guardian.status),
        "added_at": guardian.added_at,
    })
}

pub(crate) fn config_json(config: &RecoveryConfig) -> Value {
    serde_json::json!({
        "owner": hex::encode(config.owner),
        "threshold": config.threshold,
        "total_shares": config.total_shares,
        "guardians": config.guardians.iter().map(guardian_json).collect::<Vec<_>>(),
        "master_secret_hash": hex::encode(config.master_secret_hash),
        "last_request_id": config.last_request_id,
        "last_recovery_attempt": config.last_recovery_attempt,
        "policy": {
            "cooldown_secs": config.policy.cooldown_secs,
            "expiry_secs": config.policy.expiry_secs,
            "recovery_delay_secs": config.policy.recovery_delay_secs,
        },
        "fully_configured": config.is_fully_configured(),
        "created_at": config.created_at,
        "last_modified": config.last_modified,
    })
}

pub(crate) fn request_json(request: &RecoveryRequest, now: Timestamp) -> Value {
    serde_json::json!({
        "owner": hex::encode(request.owner),
        "request_id": request.request_id,
        "initiator": hex::encode(request.initiator),
        "new_owner": opt_hex(request.new_owner.as_ref().map(|k| &k[..])),
        "encrypted_challenge": hex::encode(&request.challenge.encrypted_challenge),
        "challenge_hash": hex::encode(request.challenge.challenge_hash),
        "proof_version": name(&request.challenge.version),
        "status": name(&request.effective_status(now)),
        "participants": request.participants.iter().map(hex::encode).collect::<Vec<_>>(),
        "created_at": request.created_at,
        "ready_at": request.ready_at,
        "expires_at": request.expires_at,
        "closed_at": request.closed_at,
    })
}

pub(crate) fn contact_json(contact: &EmergencyContact) -> Value {
    serde_json::json!({
        "pubkey": hex::encode(contact.pubkey),
        "nickname": opt_hex(contact.nickname.as_deref()),
        "access_level": name(&contact.access_level),
        "encrypted_key": hex::encode(&contact.encrypted_key),
        "status": name(&contact.status),
        "added_at": contact.added_at,
        "access_granted_at": contact.access_granted_at,
        "revoked_at": contact.revoked_at,
    })
}

pub(crate) fn access_json(access: &EmergencyAccess) -> Value {
    serde_json::json!({
        "owner": hex::encode(access.owner),
        "last_activity": access.last_activity,
        "inactivity_period_secs": access.inactivity_period_secs,
        "grace_period_secs": access.grace_period_secs,
        "contacts": access.contacts.iter().map(contact_json).collect::<Vec<_>>(),
        "state": name(&access.state),
        "countdown_started_at": access.countdown_started_at,
        "grace_period_ends": access.grace_deadline(),
        "created_at": access.created_at,
    })
}

pub(crate) fn transfer_json(transfer: &OwnershipTransfer) -> Value {
    let request_id = match transfer.reason {
        TransferReason::Recovery { request_id } => Some(request_id),
        TransferReason::Emergency => None,
    };
    serde_json::json!({
        "owner": hex::encode(transfer.owner),
        "new_owner": hex::encode(transfer.new_owner),
        "reason": name(&transfer.reason),
        "request_id": request_id,
        "authorized_at": transfer.authorized_at,
    })
}

/// Persist every due expiry and countdown transition now.
pub async fn sweep(state: &DaemonState, now: Timestamp) -> Result {
    let report = state.program.sweep(now)?;
    Ok(name(&report))
}

pub async fn get_daemon_info(state: &DaemonState) -> Result {
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "sweep_interval_secs": state.config.ledger.sweep_interval_secs,
        "recovery_defaults": {
            "cooldown_secs": state.config.recovery.cooldown_secs,
            "expiry_secs": state.config.recovery.expiry_secs,
            "recovery_delay_secs": state.config.recovery.recovery_delay_secs,
        },
        "emergency_defaults": {
            "inactivity_period_secs": state.config.emergency.inactivity_period_secs,
            "grace_period_secs": state.config.emergency.grace_period_secs,
        },
    }))
}

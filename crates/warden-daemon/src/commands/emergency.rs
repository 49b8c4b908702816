//! Emergency access command handlers.

use serde::Deserialize;
use serde_json::Value;
use serde_with::{hex::Hex, serde_as};
use warden_emergency::contacts::{AccessLevel, ContactInvite};
use warden_types::{PublicKey, Timestamp};

use super::{access_json, parse, transfer_json, Result};
use crate::DaemonState;

#[serde_as]
#[derive(Deserialize)]
struct OwnerParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    caller: Option<PublicKey>,
}

impl OwnerParams {
    /// Owner-signed calls default the caller to the owner.
    fn caller(&self) -> PublicKey {
        self.caller.unwrap_or(self.owner)
    }
}

#[serde_as]
#[derive(Deserialize)]
struct ContactParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    caller: Option<PublicKey>,
    #[serde_as(as = "Hex")]
    contact: PublicKey,
}

#[serde_as]
#[derive(Deserialize)]
struct InitializeParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    inactivity_period_secs: Option<u64>,
    grace_period_secs: Option<u64>,
}

/// Create the owner's emergency access record. Periods default to the
/// daemon config.
pub async fn initialize_emergency_access(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: InitializeParams = parse(params)?;
    let defaults = &state.config.emergency;
    let access = state.program.initialize_emergency_access(
        p.owner,
        p.inactivity_period_secs
            .unwrap_or(defaults.inactivity_period_secs),
        p.grace_period_secs.unwrap_or(defaults.grace_period_secs),
        now,
    )?;
    Ok(access_json(&access))
}

pub async fn record_activity(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: OwnerParams = parse(params)?;
    state.program.record_activity(&p.owner, &p.caller(), now)?;
    Ok(serde_json::json!({"last_activity": now}))
}

pub async fn start_countdown(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: OwnerParams = parse(params)?;
    state.program.start_countdown(&p.owner, now)?;
    Ok(access_json(&state.program.emergency_access(&p.owner)?))
}

pub async fn cancel_countdown(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: OwnerParams = parse(params)?;
    state.program.cancel_countdown(&p.owner, &p.caller(), now)?;
    Ok(serde_json::json!({"cancelled": true}))
}

#[serde_as]
#[derive(Deserialize)]
struct AddContactParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    caller: Option<PublicKey>,
    #[serde_as(as = "Hex")]
    contact: PublicKey,
    access_level: AccessLevel,
    #[serde_as(as = "Hex")]
    encrypted_key: Vec<u8>,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    nickname: Option<Vec<u8>>,
}

pub async fn add_emergency_contact(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: AddContactParams = parse(params)?;
    let invite = ContactInvite {
        pubkey: p.contact,
        nickname: p.nickname,
        access_level: p.access_level,
        encrypted_key: p.encrypted_key,
    };
    state
        .program
        .add_emergency_contact(&p.owner, &p.caller.unwrap_or(p.owner), invite, now)?;
    Ok(serde_json::json!({"added": true}))
}

pub async fn accept_emergency_contact(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: ContactParams = parse(params)?;
    state
        .program
        .accept_emergency_contact(&p.owner, &p.contact, now)?;
    Ok(serde_json::json!({"accepted": true}))
}

pub async fn revoke_emergency_contact(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: ContactParams = parse(params)?;
    let caller = p.caller.unwrap_or(p.owner);
    state
        .program
        .revoke_emergency_contact(&p.owner, &caller, &p.contact, now)?;
    Ok(serde_json::json!({"revoked": true}))
}

pub async fn activate_emergency_access(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: OwnerParams = parse(params)?;
    state.program.activate_emergency_access(&p.owner, now)?;
    Ok(access_json(&state.program.emergency_access(&p.owner)?))
}

pub async fn revoke_emergency_access(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: OwnerParams = parse(params)?;
    state
        .program
        .revoke_emergency_access(&p.owner, &p.caller(), now)?;
    Ok(serde_json::json!({"revoked": true}))
}

pub async fn claim_emergency_ownership(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: ContactParams = parse(params)?;
    let transfer = state
        .program
        .claim_emergency_ownership(&p.owner, &p.contact, now)?;
    Ok(transfer_json(&transfer))
}

/// Apply whatever countdown transitions are due now.
pub async fn poll_emergency(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: OwnerParams = parse(params)?;
    let changed = state.program.poll_emergency(&p.owner, now)?;
    Ok(serde_json::json!({
        "changed": changed.is_some(),
        "access": access_json(&state.program.emergency_access(&p.owner)?),
    }))
}

pub async fn get_emergency_access(state: &DaemonState, params: &Value) -> Result {
    let p: OwnerParams = parse(params)?;
    Ok(access_json(&state.program.emergency_access(&p.owner)?))
}

pub async fn get_access_level(state: &DaemonState, params: &Value) -> Result {
    let p: ContactParams = parse(params)?;
    let level = state.program.access_for(&p.owner, &p.contact)?;
    Ok(serde_json::json!({"access_level": level}))
}

//! Recovery command handlers.

use serde::Deserialize;
use serde_json::Value;
use serde_with::{hex::Hex, serde_as};
use warden_crypto::shamir::Share;
use warden_guardian::challenge::{Challenge, ProofVersion};
use warden_guardian::registry::{GuardianInvite, RecoveryPolicy};
use warden_types::{Hash, PublicKey, RequestId, Timestamp};
use zeroize::Zeroizing;

use super::{config_json, parse, request_json, transfer_json, Result};
use crate::DaemonState;

#[serde_as]
#[derive(Deserialize)]
struct OwnerParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
}

#[serde_as]
#[derive(Deserialize)]
struct GuardianParams {
    #[serde_as(as = "Hex")]
    pubkey: PublicKey,
    share_index: u8,
    #[serde_as(as = "Hex")]
    share_commitment: Hash,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    nickname: Option<Vec<u8>>,
}

impl From<GuardianParams> for GuardianInvite {
    fn from(p: GuardianParams) -> Self {
        Self {
            pubkey: p.pubkey,
            share_index: p.share_index,
            share_commitment: p.share_commitment,
            nickname: p.nickname,
        }
    }
}

#[derive(Deserialize)]
struct PolicyParams {
    cooldown_secs: Option<u64>,
    expiry_secs: Option<u64>,
    recovery_delay_secs: Option<u64>,
}

#[serde_as]
#[derive(Deserialize)]
struct InitializeParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    threshold: usize,
    total_shares: usize,
    #[serde(default)]
    guardians: Vec<GuardianParams>,
    #[serde_as(as = "Hex")]
    master_secret_hash: Hash,
    #[serde(default)]
    policy: Option<PolicyParams>,
}

/// Create a recovery config. Policy fields default to the daemon config.
pub async fn initialize_recovery_config(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: InitializeParams = parse(params)?;
    let defaults = state.config.recovery.policy();
    let policy = match p.policy {
        Some(overrides) => RecoveryPolicy {
            cooldown_secs: overrides.cooldown_secs.unwrap_or(defaults.cooldown_secs),
            expiry_secs: overrides.expiry_secs.unwrap_or(defaults.expiry_secs),
            recovery_delay_secs: overrides
                .recovery_delay_secs
                .unwrap_or(defaults.recovery_delay_secs),
        },
        None => defaults,
    };

    let config = state.program.initialize_recovery_config(
        p.owner,
        p.threshold,
        p.total_shares,
        p.guardians.into_iter().map(GuardianInvite::from).collect(),
        p.master_secret_hash,
        policy,
        now,
    )?;
    Ok(config_json(&config))
}

#[serde_as]
#[derive(Deserialize)]
struct AddGuardianParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Hex")]
    caller: PublicKey,
    guardian: GuardianParams,
}

pub async fn add_guardian(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: AddGuardianParams = parse(params)?;
    state
        .program
        .add_guardian(&p.owner, &p.caller, p.guardian.into(), now)?;
    Ok(serde_json::json!({"added": true}))
}

#[serde_as]
#[derive(Deserialize)]
struct GuardianActionParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    caller: Option<PublicKey>,
    #[serde_as(as = "Hex")]
    guardian: PublicKey,
}

pub async fn accept_guardianship(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: GuardianActionParams = parse(params)?;
    state.program.accept_guardianship(&p.owner, &p.guardian, now)?;
    Ok(serde_json::json!({"accepted": true}))
}

pub async fn remove_guardian(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: GuardianActionParams = parse(params)?;
    let caller = p
        .caller
        .ok_or_else(|| crate::rpc::RpcError::invalid_params("caller required"))?;
    state
        .program
        .remove_guardian(&p.owner, &caller, &p.guardian, now)?;
    Ok(serde_json::json!({"removed": true}))
}

#[serde_as]
#[derive(Deserialize)]
struct InitiateParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Hex")]
    initiator: PublicKey,
    #[serde_as(as = "Hex")]
    encrypted_challenge: Vec<u8>,
    #[serde_as(as = "Hex")]
    challenge_hash: Hash,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    new_owner: Option<PublicKey>,
}

pub async fn initiate_recovery(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: InitiateParams = parse(params)?;
    let challenge = Challenge {
        encrypted_challenge: p.encrypted_challenge,
        challenge_hash: p.challenge_hash,
        version: ProofVersion::V1TwoHash,
    };
    let request = state
        .program
        .initiate_recovery(&p.owner, p.initiator, challenge, p.new_owner, now)?;
    Ok(request_json(&request, now))
}

#[serde_as]
#[derive(Deserialize)]
struct RequestParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    request_id: RequestId,
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    caller: Option<PublicKey>,
}

impl RequestParams {
    fn caller(&self) -> std::result::Result<PublicKey, crate::rpc::RpcError> {
        self.caller
            .ok_or_else(|| crate::rpc::RpcError::invalid_params("caller required"))
    }
}

pub async fn confirm_participation(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: RequestParams = parse(params)?;
    let request =
        state
            .program
            .confirm_participation(&p.owner, p.request_id, p.caller()?, now)?;
    Ok(request_json(&request, now))
}

#[serde_as]
#[derive(Deserialize)]
struct CompleteParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    request_id: RequestId,
    #[serde_as(as = "Hex")]
    challenge_plaintext: Vec<u8>,
    #[serde_as(as = "Hex")]
    master_secret: Vec<u8>,
}

pub async fn complete_recovery_with_proof(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: CompleteParams = parse(params)?;
    let plaintext = Zeroizing::new(p.challenge_plaintext);
    let secret = Zeroizing::new(p.master_secret);
    let transfer = state.program.complete_recovery_with_proof(
        &p.owner,
        p.request_id,
        &plaintext,
        &secret,
        now,
    )?;
    Ok(transfer_json(&transfer))
}

pub async fn cancel_recovery(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: RequestParams = parse(params)?;
    state
        .program
        .cancel_recovery(&p.owner, p.request_id, &p.caller()?, now)?;
    Ok(serde_json::json!({"cancelled": true}))
}

pub async fn expire_recovery(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: RequestParams = parse(params)?;
    state.program.expire_recovery(&p.owner, p.request_id, now)?;
    Ok(serde_json::json!({"expired": true}))
}

pub async fn get_recovery_config(state: &DaemonState, params: &Value) -> Result {
    let p: OwnerParams = parse(params)?;
    Ok(config_json(&state.program.recovery_config(&p.owner)?))
}

pub async fn get_recovery_request(state: &DaemonState, params: &Value, now: Timestamp) -> Result {
    let p: RequestParams = parse(params)?;
    let request = state.program.recovery_request(&p.owner, p.request_id)?;
    Ok(request_json(&request, now))
}

pub async fn list_recovery_requests(
    state: &DaemonState,
    params: &Value,
    now: Timestamp,
) -> Result {
    let p: OwnerParams = parse(params)?;
    let requests = state.program.recovery_requests(&p.owner)?;
    Ok(Value::Array(
        requests.iter().map(|r| request_json(r, now)).collect(),
    ))
}

#[serde_as]
#[derive(Deserialize)]
struct VerifyShareParams {
    #[serde_as(as = "Hex")]
    owner: PublicKey,
    #[serde_as(as = "Hex")]
    guardian: PublicKey,
    share_index: u8,
    #[serde_as(as = "Hex")]
    share_data: Vec<u8>,
}

/// Audit a share against the guardian's stored commitment.
pub async fn verify_share_commitment(state: &DaemonState, params: &Value) -> Result {
    let p: VerifyShareParams = parse(params)?;
    let share = Share::new(p.share_index, p.share_data);
    let valid = state
        .program
        .verify_share_commitment(&p.owner, &p.guardian, &share)?;
    Ok(serde_json::json!({"valid": valid}))
}

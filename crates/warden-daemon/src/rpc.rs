//! JSON-RPC server over Unix socket.
//!
//! Newline-delimited JSON-RPC 2.0. Each connection is served by its own task;
//! every request is dispatched to a command handler with the current time.
//! After `subscribe_events` the connection also carries `event`
//! notifications until `unsubscribe_events` or disconnect.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use warden_guardian::GuardianError;
use warden_program::ProgramError;
use warden_types::{ErrorKind, Timestamp};

use crate::commands;
use crate::events::{EventFilter, SequencedEvent};
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC notification (server to client, no id).
#[derive(Debug, Serialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl RpcNotification {
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Malformed domain input (-32020).
    pub fn input_error(detail: &str) -> Self {
        Self::new(-32020, "INPUT_ERROR", Some(serde_json::json!({"detail": detail})))
    }

    /// Operation not valid in the current state (-32021).
    pub fn state_error(detail: &str) -> Self {
        Self::new(-32021, "STATE_ERROR", Some(serde_json::json!({"detail": detail})))
    }

    /// Recovery initiated again within the cooldown (-32022).
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            -32022,
            "RATE_LIMITED",
            Some(serde_json::json!({"retry_after_secs": retry_after_secs})),
        )
    }

    /// Recovery request past its deadline (-32023).
    pub fn recovery_expired(request_id: u64) -> Self {
        Self::new(
            -32023,
            "RECOVERY_EXPIRED",
            Some(serde_json::json!({"request_id": request_id})),
        )
    }

    /// Identity or proof check failed (-32030). Carries no detail.
    pub fn unauthorized() -> Self {
        Self::new(-32030, "UNAUTHORIZED", None)
    }

    /// Configuration value out of range (-32040).
    pub fn config_error(detail: &str) -> Self {
        Self::new(-32040, "CONFIG_ERROR", Some(serde_json::json!({"detail": detail})))
    }
}

impl From<ProgramError> for RpcError {
    fn from(err: ProgramError) -> Self {
        match err.public() {
            ProgramError::Guardian(GuardianError::RecoveryRateLimited { retry_after_secs }) => {
                Self::rate_limited(retry_after_secs)
            }
            ProgramError::Guardian(GuardianError::RecoveryExpired(request_id)) => {
                Self::recovery_expired(request_id)
            }
            err => match err.kind() {
                ErrorKind::Input => Self::input_error(&err.to_string()),
                ErrorKind::State => Self::state_error(&err.to_string()),
                ErrorKind::Auth => Self::unauthorized(),
                ErrorKind::Config => Self::config_error(&err.to_string()),
                ErrorKind::Internal => {
                    error!(error = %err, "internal error");
                    Self::internal_error("internal error")
                }
            },
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

type Subscription = (broadcast::Receiver<SequencedEvent>, EventFilter);

enum Incoming {
    Line(Option<String>),
    Event(std::result::Result<SequencedEvent, RecvError>),
}

/// Next event of the connection's subscription; never resolves without one.
async fn next_event(
    subscription: &mut Option<Subscription>,
) -> std::result::Result<SequencedEvent, RecvError> {
    match subscription {
        Some((receiver, _)) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn handle_connection(
    state: Arc<DaemonState>,
    stream: UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut subscription: Option<Subscription> = None;

    loop {
        let incoming = tokio::select! {
            line = lines.next_line() => Incoming::Line(line?),
            event = next_event(&mut subscription) => Incoming::Event(event),
        };

        let mut message = match incoming {
            Incoming::Line(None) => break, // EOF
            Incoming::Line(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond(&state, &line, &mut subscription).await;
                serde_json::to_string(&response)?
            }
            Incoming::Event(Ok(event)) => {
                let wanted = subscription
                    .as_ref()
                    .is_some_and(|(_, filter)| filter.matches(&event.event));
                if !wanted {
                    continue;
                }
                let params = serde_json::to_value(&event)?;
                serde_json::to_string(&RpcNotification::new("event", params))?
            }
            Incoming::Event(Err(RecvError::Lagged(missed))) => {
                warn!(missed, "event subscriber lagged");
                serde_json::to_string(&RpcNotification::new(
                    "events_lagged",
                    serde_json::json!({"missed": missed}),
                ))?
            }
            Incoming::Event(Err(RecvError::Closed)) => {
                subscription = None;
                continue;
            }
        };

        message.push('\n');
        writer.write_all(message.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Answer one request line, opening or closing the event subscription.
async fn respond(
    state: &DaemonState,
    line: &str,
    subscription: &mut Option<Subscription>,
) -> RpcResponse {
    let request = match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => request,
        Err(_) => return RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    };

    // Subscribe before the handler reads the sequence so nothing after it is missed.
    let receiver = (request.method == "subscribe_events").then(|| state.events.subscribe());
    let unsubscribe = request.method == "unsubscribe_events";
    let params = request.params.clone();

    let response = dispatch_request(state, request, crate::unix_now()).await;
    if response.error.is_none() {
        if let Some(receiver) = receiver {
            if let Ok(filter) = commands::events::subscription_filter(&params) {
                *subscription = Some((receiver, filter));
            }
        } else if unsubscribe {
            *subscription = None;
        }
    }
    response
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(
    state: &DaemonState,
    request: RpcRequest,
    now: Timestamp,
) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    let method = request.method.as_str();
    let params = &request.params;
    debug!("Dispatching RPC method: {}", method);

    use commands::{emergency, events, recovery};
    let result = match method {
        // Recovery
        "initialize_recovery_config" => {
            recovery::initialize_recovery_config(state, params, now).await
        }
        "add_guardian" => recovery::add_guardian(state, params, now).await,
        "accept_guardianship" => recovery::accept_guardianship(state, params, now).await,
        "remove_guardian" => recovery::remove_guardian(state, params, now).await,
        "initiate_recovery" => recovery::initiate_recovery(state, params, now).await,
        "confirm_participation" => recovery::confirm_participation(state, params, now).await,
        "complete_recovery_with_proof" => {
            recovery::complete_recovery_with_proof(state, params, now).await
        }
        "cancel_recovery" => recovery::cancel_recovery(state, params, now).await,
        "expire_recovery" => recovery::expire_recovery(state, params, now).await,
        "get_recovery_config" => recovery::get_recovery_config(state, params).await,
        "get_recovery_request" => recovery::get_recovery_request(state, params, now).await,
        "list_recovery_requests" => recovery::list_recovery_requests(state, params, now).await,
        "verify_share_commitment" => recovery::verify_share_commitment(state, params).await,

        // Emergency access
        "initialize_emergency_access" => {
            emergency::initialize_emergency_access(state, params, now).await
        }
        "record_activity" => emergency::record_activity(state, params, now).await,
        "start_countdown" => emergency::start_countdown(state, params, now).await,
        "cancel_countdown" => emergency::cancel_countdown(state, params, now).await,
        "add_emergency_contact" => emergency::add_emergency_contact(state, params, now).await,
        "accept_emergency_contact" => {
            emergency::accept_emergency_contact(state, params, now).await
        }
        "revoke_emergency_contact" => {
            emergency::revoke_emergency_contact(state, params, now).await
        }
        "activate_emergency_access" => {
            emergency::activate_emergency_access(state, params, now).await
        }
        "revoke_emergency_access" => {
            emergency::revoke_emergency_access(state, params, now).await
        }
        "claim_emergency_ownership" => {
            emergency::claim_emergency_ownership(state, params, now).await
        }
        "poll_emergency" => emergency::poll_emergency(state, params, now).await,
        "get_emergency_access" => emergency::get_emergency_access(state, params).await,
        "get_access_level" => emergency::get_access_level(state, params).await,

        // Events
        "get_events" => events::get_events(state, params).await,
        "subscribe_events" => events::subscribe_events(state, params).await,
        "unsubscribe_events" => events::unsubscribe_events(state).await,

        // Maintenance
        "sweep" => commands::sweep(state, now).await,
        "get_daemon_info" => commands::get_daemon_info(state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => RpcResponse::error(id, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_emergency::EmergencyError;
    use warden_types::{DEFAULT_GRACE_PERIOD_SECS, DEFAULT_INACTIVITY_PERIOD_SECS, SECONDS_PER_DAY};

    use crate::test_support::{hex_key, state};

    #[test]
    fn test_error_code_mapping() {
        let cases: Vec<(ProgramError, i32)> = vec![
            (GuardianError::DuplicateShareIndex(1).into(), -32020),
            (GuardianError::ActiveRecoveryExists(1).into(), -32021),
            (
                GuardianError::RecoveryRateLimited {
                    retry_after_secs: 10,
                }
                .into(),
                -32022,
            ),
            (GuardianError::RecoveryExpired(3).into(), -32023),
            (GuardianError::InvalidProof.into(), -32030),
            (GuardianError::InvalidMasterSecret.into(), -32030),
            (EmergencyError::NotOwner.into(), -32030),
            (
                GuardianError::InvalidThresholdConfiguration {
                    threshold: 1,
                    total_shares: 3,
                }
                .into(),
                -32040,
            ),
            (
                warden_ledger::LedgerError::Migration("x".into()).into(),
                -32603,
            ),
        ];
        for (err, code) in cases {
            let label = err.to_string();
            assert_eq!(RpcError::from(err).code, code, "{label}");
        }
    }

    #[test]
    fn test_unauthorized_carries_no_detail() {
        let proof = RpcError::from(ProgramError::from(GuardianError::InvalidProof));
        let secret = RpcError::from(ProgramError::from(GuardianError::InvalidMasterSecret));
        assert_eq!(proof, secret);
        assert_eq!(proof.data, None);
    }

    #[test]
    fn test_rate_limit_data() {
        let err = RpcError::from(ProgramError::from(GuardianError::RecoveryRateLimited {
            retry_after_secs: 42,
        }));
        assert_eq!(
            err.data,
            Some(serde_json::json!({"retry_after_secs": 42}))
        );
    }

    struct Client {
        lines: tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
        writer: tokio::net::unix::OwnedWriteHalf,
    }

    impl Client {
        async fn send(&mut self, id: u64, method: &str, params: serde_json::Value) {
            let mut line = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            })
            .to_string();
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await.expect("write");
        }

        async fn recv(&mut self) -> serde_json::Value {
            let line = self
                .lines
                .next_line()
                .await
                .expect("read")
                .expect("open connection");
            serde_json::from_str(&line).expect("json line")
        }
    }

    fn connect(state: Arc<DaemonState>) -> Client {
        let (client, server) = UnixStream::pair().expect("socket pair");
        tokio::spawn(handle_connection(state, server));
        let (reader, writer) = client.into_split();
        Client {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    #[tokio::test]
    async fn test_connection_streams_subscribed_events() {
        const T0: u64 = 1_700_000_000;
        let owner = [0xEE; 32];
        let state = Arc::new(state());
        for key in [owner, [0xDD; 32]] {
            state
                .program
                .initialize_emergency_access(
                    key,
                    DEFAULT_INACTIVITY_PERIOD_SECS,
                    DEFAULT_GRACE_PERIOD_SECS,
                    T0,
                )
                .expect("init");
        }
        let mut client = connect(Arc::clone(&state));

        client
            .send(1, "subscribe_events", serde_json::json!({"owner": hex_key(0xEE)}))
            .await;
        let reply = client.recv().await;
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["subscribed"], true);
        assert_eq!(reply["result"]["sequence"], 0);

        // The other owner's countdown is filtered out.
        let started = T0 + 91 * SECONDS_PER_DAY;
        state.program.poll_emergency(&[0xDD; 32], started).expect("poll other");
        state.program.poll_emergency(&owner, started).expect("poll");

        let note = client.recv().await;
        assert_eq!(note["method"], "event");
        assert!(note.get("id").is_none());
        assert_eq!(note["params"]["sequence"], 2);
        assert_eq!(note["params"]["event"]["kind"]["type"], "emergency_countdown_started");
        assert_eq!(note["params"]["event"]["kind"]["owner"], hex_key(0xEE));

        client.send(2, "unsubscribe_events", serde_json::json!({})).await;
        assert_eq!(client.recv().await["result"]["unsubscribed"], true);

        state
            .program
            .cancel_countdown(&owner, &owner, started + 1)
            .expect("cancel");
        client.send(3, "get_events", serde_json::json!({"since": 2})).await;
        let reply = client.recv().await;
        assert_eq!(reply["id"], 3);
        assert_eq!(
            reply["result"]["events"][0]["event"]["kind"]["type"],
            "emergency_countdown_cancelled"
        );
    }

    #[tokio::test]
    async fn test_connection_reports_parse_errors() {
        let mut client = connect(Arc::new(state()));
        client.writer.write_all(b"not json\n\n").await.expect("write");
        let reply = client.recv().await;
        assert_eq!(reply["error"]["code"], -32700);
        assert_eq!(reply["id"], serde_json::Value::Null);
    }
}

//! Event command handlers.
//!
//! `subscribe_events` only validates its filter here; the connection task
//! owns the subscription and streams notifications.

use serde::Deserialize;
use serde_json::Value;

use super::{parse, Result};
use crate::events::EventFilter;
use crate::rpc::RpcError;
use crate::DaemonState;

#[derive(Default, Deserialize)]
struct GetEventsParams {
    /// Return events with a larger sequence number.
    #[serde(default)]
    since: u64,
    #[serde(flatten)]
    filter: EventFilter,
}

/// Buffered events after `since`, optionally for one owner.
pub async fn get_events(state: &DaemonState, params: &Value) -> Result {
    let p: GetEventsParams = if params.is_null() {
        GetEventsParams::default()
    } else {
        parse(params)?
    };
    let events = state.events.since(p.since, &p.filter);
    Ok(serde_json::json!({
        "sequence": state.events.sequence(),
        "events": events,
    }))
}

/// Parse the filter of a `subscribe_events` call. Null params mean no filter.
pub(crate) fn subscription_filter(params: &Value) -> std::result::Result<EventFilter, RpcError> {
    if params.is_null() {
        return Ok(EventFilter::default());
    }
    parse(params)
}

pub async fn subscribe_events(state: &DaemonState, params: &Value) -> Result {
    let filter = subscription_filter(params)?;
    Ok(serde_json::json!({
        "subscribed": true,
        "owner": filter.owner.map(hex::encode),
        "sequence": state.events.sequence(),
    }))
}

pub async fn unsubscribe_events(_state: &DaemonState) -> Result {
    Ok(serde_json::json!({"unsubscribed": true}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::emergency::{initialize_emergency_access, poll_emergency};
    use crate::test_support::{hex_key, state};
    use warden_types::{Timestamp, SECONDS_PER_DAY};

    const T0: Timestamp = 1_700_000_000;

    #[tokio::test]
    async fn test_get_events_after_countdown() {
        let state = state();
        let owner = serde_json::json!({"owner": hex_key(0xEE)});
        initialize_emergency_access(&state, &owner, T0)
            .await
            .expect("init");
        initialize_emergency_access(&state, &serde_json::json!({"owner": hex_key(0xDD)}), T0)
            .await
            .expect("init other");

        let started = T0 + 91 * SECONDS_PER_DAY;
        poll_emergency(&state, &owner, started).await.expect("poll");

        let all = get_events(&state, &serde_json::json!({}))
            .await
            .expect("all events");
        assert_eq!(all["sequence"], 1);
        let events = all["events"].as_array().expect("array");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["sequence"], 1);
        assert_eq!(events[0]["event"]["timestamp"], started);
        assert_eq!(
            events[0]["event"]["kind"]["type"],
            "emergency_countdown_started"
        );
        assert_eq!(
            events[0]["event"]["kind"]["grace_period_ends"],
            started + state.config.emergency.grace_period_secs
        );

        let other = get_events(&state, &serde_json::json!({"owner": hex_key(0xDD)}))
            .await
            .expect("filtered");
        assert_eq!(other["events"], serde_json::json!([]));

        let later = get_events(&state, &serde_json::json!({"since": 1}))
            .await
            .expect("since");
        assert_eq!(later["events"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_filter() {
        let state = state();
        let err = subscribe_events(&state, &serde_json::json!({"owner": "zz"}))
            .await
            .expect_err("bad owner");
        assert_eq!(err.code, -32602);

        let ok = subscribe_events(&state, &Value::Null)
            .await
            .expect("no filter");
        assert_eq!(ok["subscribed"], true);
        assert_eq!(ok["owner"], Value::Null);
        assert_eq!(ok["sequence"], 0);
    }
}

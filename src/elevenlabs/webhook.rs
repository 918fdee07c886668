use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::store::{CallDirection, CallStatus, CallUpsert};
use crate::AppState;

/// JSON payload ElevenLabs POSTs when a bridged call starts a live
/// conversation session.
#[derive(Debug, Deserialize)]
pub struct ConversationInitiation {
    pub caller_id: String,
    /// The provider-side agent id. Checked against our record, but the
    /// provider is the source of truth once a session exists.
    #[serde(default)]
    pub agent_id: Option<String>,
    pub called_number: String,
    pub call_sid: String,
}

/// Session configuration returned to ElevenLabs.
#[derive(Debug, Serialize)]
pub struct InitiationResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub dynamic_variables: BTreeMap<String, String>,
}

impl InitiationResponse {
    fn with_variables(dynamic_variables: BTreeMap<String, String>) -> Self {
        Self {
            kind: "conversation_initiation_client_data",
            dynamic_variables,
        }
    }

    /// Minimal configuration for sessions we cannot correlate. The provider
    /// still gets a valid response rather than an error that would tear
    /// down the live call.
    fn minimal(payload: &ConversationInitiation) -> Self {
        Self::with_variables(BTreeMap::from([
            ("caller_number".to_string(), payload.caller_id.clone()),
            ("called_number".to_string(), payload.called_number.clone()),
        ]))
    }
}

/// Handle POST /elevenlabs/conversation-initiation.
///
/// Correlates the session to the in-progress call by called number and call
/// sid, marks the call in progress, and returns the session configuration.
/// Always 200.
pub async fn handle_conversation_initiation(
    State(state): State<AppState>,
    Json(payload): Json<ConversationInitiation>,
) -> Json<InitiationResponse> {
    Json(initiate_conversation(&state, &payload).await)
}

pub(crate) async fn initiate_conversation(
    state: &AppState,
    payload: &ConversationInitiation,
) -> InitiationResponse {
    let agent = match state.store.resolve_by_number(&payload.called_number).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(call_sid = %payload.call_sid, "Agent lookup failed: {e}");
            None
        }
    };

    let Some(agent) = agent else {
        tracing::warn!(
            called_number = %payload.called_number,
            call_sid = %payload.call_sid,
            "No agent for conversation initiation"
        );
        return InitiationResponse::minimal(payload);
    };

    match (payload.agent_id.as_deref(), agent.elevenlabs_agent_id.as_deref()) {
        (Some(got), Some(expected)) if got != expected => {
            tracing::warn!(
                agent_id = %agent.id,
                expected,
                got,
                "ElevenLabs agent id does not match the assignment record"
            );
        }
        _ => {}
    }

    match state.store.elevenlabs_credentials(&agent.account_id).await {
        Ok(Some(creds)) if creds.is_usable() => {}
        Ok(_) => {
            tracing::warn!(
                account_id = %agent.account_id,
                "ElevenLabs credentials missing or disabled at initiation"
            );
            return InitiationResponse::minimal(payload);
        }
        Err(e) => {
            tracing::error!(account_id = %agent.account_id, "Credential lookup failed: {e}");
            return InitiationResponse::minimal(payload);
        }
    }

    // The voice webhook may or may not have landed yet; either way this
    // settles the same row for the sid.
    let upsert = CallUpsert {
        call_sid: &payload.call_sid,
        account_id: &agent.account_id,
        agent_id: Some(&agent.id),
        phone_number: Some(&payload.called_number),
        from_number: Some(&payload.caller_id),
        direction: CallDirection::Inbound,
        status: CallStatus::InProgress,
    };
    if let Err(e) = state.store.upsert_call(upsert).await {
        tracing::error!(call_sid = %payload.call_sid, "Failed to record call: {e}");
    }

    tracing::info!(
        call_sid = %payload.call_sid,
        agent_id = %agent.id,
        "Conversation session configured"
    );

    InitiationResponse::with_variables(BTreeMap::from([
        ("caller_number".to_string(), payload.caller_id.clone()),
        ("called_number".to_string(), payload.called_number.clone()),
        ("agent_name".to_string(), agent.name.clone()),
        ("account_id".to_string(), agent.account_id.clone()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, Config, DatabaseConfig, ServerConfig};
    use crate::store::{Agent, AgentKind, ConfigStatus, Store};

    fn test_state(store: Store) -> AppState {
        AppState {
            config: Config {
                server: ServerConfig {
                    host: "127.0.0.1".into(),
                    port: 0,
                    external_url: "https://voice.example.com".into(),
                },
                api: ApiConfig {
                    token: "test-token".into(),
                },
                database: DatabaseConfig::default(),
                elevenlabs: Default::default(),
            },
            store,
        }
    }

    async fn seeded_state() -> (AppState, String, Agent) {
        let store = Store::open_in_memory().unwrap();
        let account = store.create_account("Acme Support").await.unwrap();
        store
            .set_twilio_credentials(&account.id, "AC123", "tok", ConfigStatus::Active)
            .await
            .unwrap();
        store
            .set_elevenlabs_credentials(&account.id, "el_key", ConfigStatus::Active)
            .await
            .unwrap();
        let agent = store
            .create_agent(&account.id, AgentKind::Inbound, "Receptionist", Some("agent_xyz"))
            .await
            .unwrap();
        let agent = store
            .assign_phone(&account.id, &agent.id, "+1234567890")
            .await
            .unwrap();
        (test_state(store), account.id, agent)
    }

    fn initiation(call_sid: &str) -> ConversationInitiation {
        ConversationInitiation {
            caller_id: "+1987654321".into(),
            agent_id: Some("agent_xyz".into()),
            called_number: "+1234567890".into(),
            call_sid: call_sid.into(),
        }
    }

    #[tokio::test]
    async fn resolved_session_gets_agent_variables() {
        let (state, account_id, _) = seeded_state().await;

        let response = initiate_conversation(&state, &initiation("CA200")).await;
        assert_eq!(response.kind, "conversation_initiation_client_data");
        assert_eq!(
            response.dynamic_variables.get("agent_name").map(String::as_str),
            Some("Receptionist")
        );
        assert_eq!(
            response.dynamic_variables.get("account_id").map(String::as_str),
            Some(account_id.as_str())
        );
    }

    #[tokio::test]
    async fn unknown_number_gets_minimal_payload() {
        let (state, _, _) = seeded_state().await;
        let mut payload = initiation("CA201");
        payload.called_number = "+1999999999".into();

        let response = initiate_conversation(&state, &payload).await;
        assert_eq!(response.kind, "conversation_initiation_client_data");
        assert!(!response.dynamic_variables.contains_key("agent_name"));
        assert!(state.store.find_call_by_sid("CA201").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn initiation_marks_call_in_progress() {
        let (state, _, agent) = seeded_state().await;

        initiate_conversation(&state, &initiation("CA202")).await;

        let call = state
            .store
            .find_call_by_sid("CA202")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.status, CallStatus::InProgress);
        assert_eq!(call.agent_id.as_deref(), Some(agent.id.as_str()));
        assert_eq!(call.phone_number.as_deref(), Some("+1234567890"));
    }

    #[tokio::test]
    async fn initiation_does_not_duplicate_existing_call() {
        let (state, account_id, agent) = seeded_state().await;

        // Voice webhook already created the row
        state
            .store
            .upsert_call(CallUpsert {
                call_sid: "CA203",
                account_id: &account_id,
                agent_id: Some(&agent.id),
                phone_number: Some("+1234567890"),
                from_number: Some("+1987654321"),
                direction: CallDirection::Inbound,
                status: CallStatus::Initiated,
            })
            .await
            .unwrap();

        initiate_conversation(&state, &initiation("CA203")).await;

        let calls = state
            .store
            .find_recent_calls(&account_id, Some(CallDirection::Inbound), 10)
            .await
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].status, CallStatus::InProgress);
    }

    #[tokio::test]
    async fn mismatched_agent_id_still_configures_session() {
        let (state, _, _) = seeded_state().await;
        let mut payload = initiation("CA204");
        payload.agent_id = Some("agent_other".into());

        let response = initiate_conversation(&state, &payload).await;
        assert!(response.dynamic_variables.contains_key("agent_name"));
        assert!(state.store.find_call_by_sid("CA204").await.unwrap().is_some());
    }
}

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::store::{Agent, CallDirection, CallStatus, CallUpsert};
use crate::twilio::twiml;
use crate::AppState;

/// Spoken when no agent can take the call.
const FALLBACK_MESSAGE: &str =
    "We're sorry, this number is not available right now. Please try again later.";

/// Form-encoded payload Twilio POSTs on every voice event.
#[derive(Debug, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "AccountSid")]
    pub account_sid: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
    #[serde(rename = "Direction", default)]
    pub direction: Option<String>,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
}

/// Handle POST /twilio/voice — Twilio webhook for incoming calls.
///
/// Resolves the called number to an inbound agent and responds with TwiML
/// that bridges the call's media to the agent's ElevenLabs conversation.
/// Always answers 200 with a well-formed TwiML document; resolution
/// failures degrade to a spoken fallback and hangup, never an error status,
/// since the carrier cannot interpret application error bodies.
pub async fn handle_voice(
    State(state): State<AppState>,
    Form(hook): Form<VoiceWebhook>,
) -> Response {
    let twiml = route_voice(&state, &hook).await;
    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}

pub(crate) async fn route_voice(state: &AppState, hook: &VoiceWebhook) -> String {
    if let Some(speech) = hook.speech_result.as_deref() {
        tracing::debug!(call_sid = %hook.call_sid, speech, "Speech result on voice event");
    }

    let status = hook
        .call_status
        .as_deref()
        .and_then(CallStatus::from_twilio)
        .unwrap_or(CallStatus::Initiated);

    let agent = match state.store.resolve_inbound(&hook.to, &hook.account_sid).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(call_sid = %hook.call_sid, "Agent lookup failed: {e}");
            None
        }
    };

    let Some(agent) = agent else {
        tracing::warn!(
            to = %hook.to,
            account_sid = %hook.account_sid,
            "No inbound agent for number"
        );
        // Record the attempt if the AccountSid maps to a known tenant
        if let Ok(Some(account_id)) = state.store.account_id_by_twilio_sid(&hook.account_sid).await
        {
            record_call(state, hook, &account_id, None, status).await;
        }
        return twiml::say_hangup(FALLBACK_MESSAGE);
    };

    record_call(state, hook, &agent.account_id, Some(&agent), status).await;

    let Some(elevenlabs_agent_id) = agent.elevenlabs_agent_id.as_deref() else {
        tracing::warn!(
            agent_id = %agent.id,
            "Inbound agent has no ElevenLabs agent id, cannot bridge"
        );
        return twiml::say_hangup(FALLBACK_MESSAGE);
    };

    match state.store.elevenlabs_credentials(&agent.account_id).await {
        Ok(Some(creds)) if creds.is_usable() => {}
        Ok(_) => {
            tracing::warn!(
                account_id = %agent.account_id,
                "ElevenLabs credentials missing or disabled, cannot bridge"
            );
            return twiml::say_hangup(FALLBACK_MESSAGE);
        }
        Err(e) => {
            tracing::error!(account_id = %agent.account_id, "Credential lookup failed: {e}");
            return twiml::say_hangup(FALLBACK_MESSAGE);
        }
    }

    tracing::info!(
        call_sid = %hook.call_sid,
        agent_id = %agent.id,
        to = %hook.to,
        "Inbound call routed to agent"
    );

    let stream_url = format!(
        "{}?agent_id={}",
        state.config.elevenlabs.stream_base_url, elevenlabs_agent_id
    );
    let initiation_url = format!(
        "{}/elevenlabs/conversation-initiation",
        state.config.server.external_url
    );
    twiml::connect_stream(
        &stream_url,
        &[
            ("caller_number", &hook.from),
            ("called_number", &hook.to),
            ("call_sid", &hook.call_sid),
            ("initiation_webhook_url", &initiation_url),
        ],
    )
}

async fn record_call(
    state: &AppState,
    hook: &VoiceWebhook,
    account_id: &str,
    agent: Option<&Agent>,
    status: CallStatus,
) {
    let direction = match hook.direction.as_deref() {
        Some(d) if d.starts_with("outbound") => CallDirection::Outbound,
        _ => CallDirection::Inbound,
    };
    let upsert = CallUpsert {
        call_sid: &hook.call_sid,
        account_id,
        agent_id: agent.map(|a| a.id.as_str()),
        phone_number: Some(&hook.to),
        from_number: Some(&hook.from),
        direction,
        status,
    };
    // Persistence failures must not take down the webhook response
    if let Err(e) = state.store.upsert_call(upsert).await {
        tracing::error!(call_sid = %hook.call_sid, "Failed to record call: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, Config, DatabaseConfig, ServerConfig};
    use crate::store::{AgentKind, ConfigStatus, Store};

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

    fn voice_hook(call_sid: &str, to: &str) -> VoiceWebhook {
        VoiceWebhook {
            call_sid: call_sid.into(),
            account_sid: "AC123".into(),
            from: "+1987654321".into(),
            to: to.into(),
            call_status: Some("ringing".into()),
            direction: Some("inbound".into()),
            speech_result: None,
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

    #[tokio::test]
    async fn resolved_call_connects_to_agent_stream() {
        let (state, _, _) = seeded_state().await;

        let twiml = route_voice(&state, &voice_hook("CA100", "+1234567890")).await;
        assert!(twiml.contains("agent_id=agent_xyz"));
        assert!(twiml.contains("<Connect>"));
        assert!(twiml.contains(
            "https://voice.example.com/elevenlabs/conversation-initiation"
        ));
    }

    #[tokio::test]
    async fn resolved_call_is_recorded_with_agent_and_number() {
        let (state, account_id, agent) = seeded_state().await;

        route_voice(&state, &voice_hook("CA101", "+1234567890")).await;

        let call = state
            .store
            .find_call_by_sid("CA101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.account_id, account_id);
        assert_eq!(call.agent_id.as_deref(), Some(agent.id.as_str()));
        assert_eq!(call.phone_number.as_deref(), Some("+1234567890"));
        assert_eq!(call.direction, CallDirection::Inbound);
    }

    #[tokio::test]
    async fn unknown_number_gets_graceful_twiml() {
        let (state, account_id, _) = seeded_state().await;

        let twiml = route_voice(&state, &voice_hook("CA102", "+1999999999")).await;
        assert!(twiml.contains("<Say>"));
        assert!(twiml.contains("<Hangup/>"));
        assert!(!twiml.contains("<Connect>"));

        // Known tenant, so the attempt is still recorded, without an agent
        let call = state
            .store
            .find_call_by_sid("CA102")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.account_id, account_id);
        assert_eq!(call.agent_id, None);
    }

    #[tokio::test]
    async fn unknown_tenant_gets_graceful_twiml_and_no_record() {
        let (state, _, _) = seeded_state().await;
        let mut hook = voice_hook("CA103", "+1234567890");
        hook.account_sid = "AC_UNKNOWN".into();

        let twiml = route_voice(&state, &hook).await;
        assert!(twiml.contains("<Hangup/>"));
        assert!(state.store.find_call_by_sid("CA103").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_elevenlabs_agent_id_falls_back() {
        let store = Store::open_in_memory().unwrap();
        let account = store.create_account("Acme").await.unwrap();
        store
            .set_twilio_credentials(&account.id, "AC123", "tok", ConfigStatus::Active)
            .await
            .unwrap();
        store
            .set_elevenlabs_credentials(&account.id, "el_key", ConfigStatus::Active)
            .await
            .unwrap();
        let agent = store
            .create_agent(&account.id, AgentKind::Inbound, "Unbridged", None)
            .await
            .unwrap();
        store
            .assign_phone(&account.id, &agent.id, "+1234567890")
            .await
            .unwrap();
        let state = test_state(store);

        let twiml = route_voice(&state, &voice_hook("CA104", "+1234567890")).await;
        assert!(twiml.contains("<Hangup/>"));

        // The call is still recorded against the resolved agent
        let call = state
            .store
            .find_call_by_sid("CA104")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.agent_id.as_deref(), Some(agent.id.as_str()));
    }

    #[tokio::test]
    async fn disabled_elevenlabs_credentials_fall_back() {
        let (state, account_id, _) = seeded_state().await;
        state
            .store
            .set_elevenlabs_credentials(&account_id, "el_key", ConfigStatus::Disabled)
            .await
            .unwrap();

        let twiml = route_voice(&state, &voice_hook("CA105", "+1234567890")).await;
        assert!(twiml.contains("<Hangup/>"));
    }

    #[tokio::test]
    async fn repeated_deliveries_keep_one_call_row() {
        let (state, account_id, _) = seeded_state().await;

        route_voice(&state, &voice_hook("CA106", "+1234567890")).await;
        let mut hook = voice_hook("CA106", "+1234567890");
        hook.call_status = Some("in-progress".into());
        route_voice(&state, &hook).await;

        let calls = state
            .store
            .find_recent_calls(&account_id, Some(CallDirection::Inbound), 10)
            .await
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].status, CallStatus::InProgress);
    }
}

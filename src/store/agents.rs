use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{bad_column, timestamp_column, Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Inbound,
    Outbound,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Inbound => "inbound",
            AgentKind::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(AgentKind::Inbound),
            "outbound" => Some(AgentKind::Outbound),
            _ => None,
        }
    }
}

/// A configured voice-AI persona belonging to an account.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: String,
    pub account_id: String,
    pub kind: AgentKind,
    pub name: String,
    /// Set and cleared through phone assignment; at most one agent per
    /// account holds a given number at a time.
    pub phone_number: Option<String>,
    /// The provider-side agent id; inbound agents need this to take calls.
    pub elevenlabs_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

const AGENT_COLUMNS: &str =
    "a.id, a.account_id, a.kind, a.name, a.phone_number, a.elevenlabs_agent_id, a.created_at";

fn agent_from_row(row: &Row) -> rusqlite::Result<Agent> {
    let kind: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    Ok(Agent {
        id: row.get(0)?,
        account_id: row.get(1)?,
        kind: AgentKind::parse(&kind)
            .ok_or_else(|| bad_column(2, format!("unknown agent kind {kind:?}")))?,
        name: row.get(3)?,
        phone_number: row.get(4)?,
        elevenlabs_agent_id: row.get(5)?,
        created_at: timestamp_column(6, created_at)?,
    })
}

impl Store {
    /// Agents are created by the agent-management flow, which lives outside
    /// this service; this exists for seeding and tests.
    pub async fn create_agent(
        &self,
        account_id: &str,
        kind: AgentKind,
        name: &str,
        elevenlabs_agent_id: Option<&str>,
    ) -> Result<Agent, StoreError> {
        let agent = Agent {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            kind,
            name: name.to_string(),
            phone_number: None,
            elevenlabs_agent_id: elevenlabs_agent_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.lock().await.execute(
            "INSERT INTO agents (id, account_id, kind, name, phone_number, elevenlabs_agent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
            params![
                agent.id,
                agent.account_id,
                agent.kind.as_str(),
                agent.name,
                agent.elevenlabs_agent_id,
                agent.created_at.to_rfc3339()
            ],
        )?;
        Ok(agent)
    }

    pub async fn agent(&self, account_id: &str, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        let agent = self
            .lock()
            .await
            .query_row(
                &format!(
                    "SELECT {AGENT_COLUMNS} FROM agents a WHERE a.id = ?1 AND a.account_id = ?2"
                ),
                params![agent_id, account_id],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    /// Bind a phone number to an agent, scoped to the agent's account.
    ///
    /// Exclusivity is enforced inside one transaction: any other agent in
    /// the same account holding the number is cleared before the new
    /// assignment lands, so a number can never route to two agents.
    /// Last writer wins; the reassignment is logged, not rejected.
    pub async fn assign_phone(
        &self,
        account_id: &str,
        agent_id: &str,
        phone_number: &str,
    ) -> Result<Agent, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM agents WHERE id = ?1 AND account_id = ?2",
                params![agent_id, account_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound("agent"));
        }

        let cleared = tx.execute(
            "UPDATE agents SET phone_number = NULL
             WHERE account_id = ?1 AND phone_number = ?2 AND id != ?3",
            params![account_id, phone_number, agent_id],
        )?;
        if cleared > 0 {
            tracing::info!(
                phone_number,
                agent_id,
                "Number reassigned away from its previous holder"
            );
        }

        tx.execute(
            "UPDATE agents SET phone_number = ?1 WHERE id = ?2",
            params![phone_number, agent_id],
        )?;

        let agent = tx.query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents a WHERE a.id = ?1"),
            params![agent_id],
            agent_from_row,
        )?;
        tx.commit()?;
        Ok(agent)
    }

    pub async fn unassign_phone(&self, account_id: &str, agent_id: &str) -> Result<(), StoreError> {
        let updated = self.lock().await.execute(
            "UPDATE agents SET phone_number = NULL WHERE id = ?1 AND account_id = ?2",
            params![agent_id, account_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound("agent"));
        }
        Ok(())
    }

    /// Inbound agents with a number assigned, for the management surface.
    pub async fn list_inbound_assigned(&self, account_id: &str) -> Result<Vec<Agent>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents a
             WHERE a.account_id = ?1 AND a.kind = 'inbound' AND a.phone_number IS NOT NULL
             ORDER BY a.created_at"
        ))?;
        let agents = stmt
            .query_map(params![account_id], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(agents)
    }

    /// Resolve a Twilio voice webhook to the inbound agent owning the called
    /// number, requiring that the owning account's Twilio credentials match
    /// the AccountSid on the delivery and are complete and active.
    pub async fn resolve_inbound(
        &self,
        to_number: &str,
        twilio_account_sid: &str,
    ) -> Result<Option<Agent>, StoreError> {
        let agent = self
            .lock()
            .await
            .query_row(
                &format!(
                    "SELECT {AGENT_COLUMNS} FROM agents a
                     JOIN twilio_configs t ON t.account_id = a.account_id
                     WHERE a.phone_number = ?1
                       AND a.kind = 'inbound'
                       AND t.account_sid = ?2
                       AND t.status = 'active'
                       AND t.account_sid != ''
                       AND t.auth_token != ''
                     LIMIT 1"
                ),
                params![to_number, twilio_account_sid],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }

    /// Resolve a called number to its inbound agent without a tenant hint.
    /// Used by the conversation-initiation webhook, which carries no
    /// AccountSid; the E.164 number itself identifies the tenant.
    pub async fn resolve_by_number(&self, called_number: &str) -> Result<Option<Agent>, StoreError> {
        let agent = self
            .lock()
            .await
            .query_row(
                &format!(
                    "SELECT {AGENT_COLUMNS} FROM agents a
                     WHERE a.phone_number = ?1 AND a.kind = 'inbound'
                     LIMIT 1"
                ),
                params![called_number],
                agent_from_row,
            )
            .optional()?;
        Ok(agent)
    }
}

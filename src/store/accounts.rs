use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{bad_column, Store, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStatus {
    Active,
    Disabled,
}

impl ConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Active => "active",
            ConfigStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ConfigStatus::Active),
            "disabled" => Some(ConfigStatus::Disabled),
            _ => None,
        }
    }
}

/// Per-account Twilio credentials.
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_id: String,
    pub account_sid: String,
    pub auth_token: String,
    pub status: ConfigStatus,
}

impl TwilioCredentials {
    /// Both credential fields must be present for the account to
    /// originate or receive calls.
    pub fn is_routable(&self) -> bool {
        self.status == ConfigStatus::Active
            && !self.account_sid.is_empty()
            && !self.auth_token.is_empty()
    }
}

/// Per-account ElevenLabs credentials.
#[derive(Debug, Clone)]
pub struct ElevenLabsCredentials {
    pub account_id: String,
    pub api_key: String,
    pub status: ConfigStatus,
}

impl ElevenLabsCredentials {
    pub fn is_usable(&self) -> bool {
        self.status == ConfigStatus::Active && !self.api_key.is_empty()
    }
}

impl Store {
    pub async fn create_account(&self, name: &str) -> Result<Account, StoreError> {
        let account = Account {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.lock().await.execute(
            "INSERT INTO accounts (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![account.id, account.name, account.created_at.to_rfc3339()],
        )?;
        Ok(account)
    }

    pub async fn set_twilio_credentials(
        &self,
        account_id: &str,
        account_sid: &str,
        auth_token: &str,
        status: ConfigStatus,
    ) -> Result<(), StoreError> {
        self.lock().await.execute(
            "INSERT INTO twilio_configs (account_id, account_sid, auth_token, status)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(account_id) DO UPDATE SET
                 account_sid = excluded.account_sid,
                 auth_token = excluded.auth_token,
                 status = excluded.status",
            params![account_id, account_sid, auth_token, status.as_str()],
        )?;
        Ok(())
    }

    pub async fn twilio_credentials(
        &self,
        account_id: &str,
    ) -> Result<Option<TwilioCredentials>, StoreError> {
        let creds = self
            .lock()
            .await
            .query_row(
                "SELECT account_id, account_sid, auth_token, status
                 FROM twilio_configs WHERE account_id = ?1",
                params![account_id],
                |row| {
                    let status: String = row.get(3)?;
                    Ok(TwilioCredentials {
                        account_id: row.get(0)?,
                        account_sid: row.get(1)?,
                        auth_token: row.get(2)?,
                        status: ConfigStatus::parse(&status)
                            .ok_or_else(|| bad_column(3, format!("unknown status {status:?}")))?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    pub async fn set_elevenlabs_credentials(
        &self,
        account_id: &str,
        api_key: &str,
        status: ConfigStatus,
    ) -> Result<(), StoreError> {
        self.lock().await.execute(
            "INSERT INTO elevenlabs_configs (account_id, api_key, status)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id) DO UPDATE SET
                 api_key = excluded.api_key,
                 status = excluded.status",
            params![account_id, api_key, status.as_str()],
        )?;
        Ok(())
    }

    pub async fn elevenlabs_credentials(
        &self,
        account_id: &str,
    ) -> Result<Option<ElevenLabsCredentials>, StoreError> {
        let creds = self
            .lock()
            .await
            .query_row(
                "SELECT account_id, api_key, status
                 FROM elevenlabs_configs WHERE account_id = ?1",
                params![account_id],
                |row| {
                    let status: String = row.get(2)?;
                    Ok(ElevenLabsCredentials {
                        account_id: row.get(0)?,
                        api_key: row.get(1)?,
                        status: ConfigStatus::parse(&status)
                            .ok_or_else(|| bad_column(2, format!("unknown status {status:?}")))?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    /// Tenant lookup for a Twilio webhook delivery, keyed by the AccountSid
    /// Twilio sends with every call event.
    pub async fn account_id_by_twilio_sid(
        &self,
        account_sid: &str,
    ) -> Result<Option<String>, StoreError> {
        let id = self
            .lock()
            .await
            .query_row(
                "SELECT account_id FROM twilio_configs
                 WHERE account_sid = ?1 AND status = 'active'",
                params![account_sid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

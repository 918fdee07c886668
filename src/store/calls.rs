use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{bad_column, timestamp_column, Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(CallDirection::Inbound),
            "outbound" => Some(CallDirection::Outbound),
            _ => None,
        }
    }
}

/// Call lifecycle: initiated -> in_progress -> completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(CallStatus::Initiated),
            "in_progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Map a Twilio CallStatus value onto the call lifecycle.
    pub fn from_twilio(s: &str) -> Option<Self> {
        match s {
            "queued" | "ringing" => Some(CallStatus::Initiated),
            "in-progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "busy" | "failed" | "no-answer" | "canceled" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Position in the lifecycle; upserts never move a call backwards, so
    /// a late "ringing" delivery cannot reset an in-progress call.
    fn rank(self) -> u8 {
        match self {
            CallStatus::Initiated => 0,
            CallStatus::InProgress => 1,
            CallStatus::Completed | CallStatus::Failed => 2,
        }
    }
}

/// One row per call attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Call {
    pub id: String,
    pub call_sid: String,
    pub account_id: String,
    pub agent_id: Option<String>,
    pub phone_number: Option<String>,
    pub from_number: Option<String>,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a webhook delivery contributes to the call row for its sid.
/// `None` means "this delivery does not know", never "clear the column".
#[derive(Debug, Clone, Copy)]
pub struct CallUpsert<'a> {
    pub call_sid: &'a str,
    pub account_id: &'a str,
    pub agent_id: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub from_number: Option<&'a str>,
    pub direction: CallDirection,
    pub status: CallStatus,
}

const CALL_COLUMNS: &str = "id, call_sid, account_id, agent_id, phone_number, from_number, \
                            direction, status, created_at, updated_at";

fn call_from_row(row: &Row) -> rusqlite::Result<Call> {
    let direction: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Call {
        id: row.get(0)?,
        call_sid: row.get(1)?,
        account_id: row.get(2)?,
        agent_id: row.get(3)?,
        phone_number: row.get(4)?,
        from_number: row.get(5)?,
        direction: CallDirection::parse(&direction)
            .ok_or_else(|| bad_column(6, format!("unknown direction {direction:?}")))?,
        status: CallStatus::parse(&status)
            .ok_or_else(|| bad_column(7, format!("unknown status {status:?}")))?,
        created_at: timestamp_column(8, created_at)?,
        updated_at: timestamp_column(9, updated_at)?,
    })
}

impl Store {
    /// Create or update the call row for a sid.
    ///
    /// The two handshake webhooks arrive nearly concurrently and in no
    /// guaranteed order, so this is the single write path for both: the
    /// first delivery inserts, every later one fills in columns it knows
    /// (without clearing ones it doesn't) and advances the status. The
    /// connection mutex makes the read-modify-write atomic in process;
    /// the UNIQUE constraint on call_sid backstops it.
    pub async fn upsert_call(&self, upsert: CallUpsert<'_>) -> Result<Call, StoreError> {
        let conn = self.lock().await;
        let existing = conn
            .query_row(
                &format!("SELECT {CALL_COLUMNS} FROM calls WHERE call_sid = ?1"),
                params![upsert.call_sid],
                call_from_row,
            )
            .optional()?;

        match existing {
            None => {
                let now = Utc::now();
                let call = Call {
                    id: Uuid::new_v4().to_string(),
                    call_sid: upsert.call_sid.to_string(),
                    account_id: upsert.account_id.to_string(),
                    agent_id: upsert.agent_id.map(str::to_string),
                    phone_number: upsert.phone_number.map(str::to_string),
                    from_number: upsert.from_number.map(str::to_string),
                    direction: upsert.direction,
                    status: upsert.status,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    "INSERT INTO calls (id, call_sid, account_id, agent_id, phone_number,
                                        from_number, direction, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        call.id,
                        call.call_sid,
                        call.account_id,
                        call.agent_id,
                        call.phone_number,
                        call.from_number,
                        call.direction.as_str(),
                        call.status.as_str(),
                        call.created_at.to_rfc3339(),
                        call.updated_at.to_rfc3339()
                    ],
                )?;
                Ok(call)
            }
            Some(mut call) => {
                if upsert.status.rank() > call.status.rank() {
                    call.status = upsert.status;
                }
                if call.agent_id.is_none() {
                    call.agent_id = upsert.agent_id.map(str::to_string);
                }
                if call.phone_number.is_none() {
                    call.phone_number = upsert.phone_number.map(str::to_string);
                }
                if call.from_number.is_none() {
                    call.from_number = upsert.from_number.map(str::to_string);
                }
                call.updated_at = Utc::now();
                conn.execute(
                    "UPDATE calls SET agent_id = ?1, phone_number = ?2, from_number = ?3,
                                      status = ?4, updated_at = ?5
                     WHERE call_sid = ?6",
                    params![
                        call.agent_id,
                        call.phone_number,
                        call.from_number,
                        call.status.as_str(),
                        call.updated_at.to_rfc3339(),
                        call.call_sid
                    ],
                )?;
                Ok(call)
            }
        }
    }

    pub async fn find_call_by_sid(&self, call_sid: &str) -> Result<Option<Call>, StoreError> {
        let call = self
            .lock()
            .await
            .query_row(
                &format!("SELECT {CALL_COLUMNS} FROM calls WHERE call_sid = ?1"),
                params![call_sid],
                call_from_row,
            )
            .optional()?;
        Ok(call)
    }

    /// Recent calls for an account, newest first, optionally filtered by
    /// direction.
    pub async fn find_recent_calls(
        &self,
        account_id: &str,
        direction: Option<CallDirection>,
        limit: u32,
    ) -> Result<Vec<Call>, StoreError> {
        let conn = self.lock().await;
        let calls = match direction {
            Some(direction) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CALL_COLUMNS} FROM calls
                     WHERE account_id = ?1 AND direction = ?2
                     ORDER BY created_at DESC LIMIT ?3"
                ))?;
                let calls = stmt
                    .query_map(params![account_id, direction.as_str(), limit], call_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                calls
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CALL_COLUMNS} FROM calls
                     WHERE account_id = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let calls = stmt
                    .query_map(params![account_id, limit], call_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                calls
            }
        };
        Ok(calls)
    }
}

//! SQL schema for the tenant, agent, and call tables.

pub const SCHEMA: &str = r#"
-- Tenant root; every other row hangs off an account
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Twilio credentials, one row per account
CREATE TABLE IF NOT EXISTS twilio_configs (
    account_id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
    account_sid TEXT NOT NULL,
    auth_token TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);

-- ElevenLabs credentials, one row per account
CREATE TABLE IF NOT EXISTS elevenlabs_configs (
    account_id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
    api_key TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);

-- Voice-AI personas; phone_number is the only column this service mutates
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    phone_number TEXT,
    elevenlabs_agent_id TEXT,
    created_at TEXT NOT NULL
);

-- One row per call attempt; call_sid is the correlation key across the
-- voice webhook and the conversation-initiation webhook
CREATE TABLE IF NOT EXISTS calls (
    id TEXT PRIMARY KEY,
    call_sid TEXT NOT NULL UNIQUE,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    agent_id TEXT REFERENCES agents(id) ON DELETE SET NULL,
    phone_number TEXT,
    from_number TEXT,
    direction TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'initiated',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_agents_account_id ON agents(account_id);
CREATE INDEX IF NOT EXISTS idx_agents_phone_number ON agents(phone_number);
CREATE INDEX IF NOT EXISTS idx_calls_account_created ON calls(account_id, created_at);
"#;

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL Twilio and ElevenLabs can reach, e.g. "https://voice.example.com".
    /// Embedded in TwiML so the conversation-initiation webhook routes back here.
    pub external_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    /// Bearer token required for /api/* endpoints. If empty, all requests are rejected.
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    config_dir()
        .join("voiceline.db")
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElevenLabsConfig {
    /// WebSocket endpoint Twilio bridges call media to; the agent id is
    /// appended as a query parameter per call.
    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            stream_base_url: default_stream_base_url(),
        }
    }
}

fn default_stream_base_url() -> String {
    "wss://api.elevenlabs.io/v1/convai/conversation".to_string()
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file from same directory as config.toml
        let env_path = config_dir().join(".env");
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!("Loaded .env from {}", env_path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(
                    "No .env file at {}, using environment only",
                    env_path.display()
                );
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let path = config_path();
        tracing::info!("Loading config from {}", path.display());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            format!(
                "Failed to read config at {}: {}. Copy config.example.toml to {}",
                path.display(),
                e,
                path.display()
            )
        })?;

        let mut config: Config = toml::from_str(&contents)?;

        // Allow env var overrides for secrets
        if let Ok(v) = std::env::var("VOICELINE_API_TOKEN") {
            config.api.token = v;
        }
        if let Ok(v) = std::env::var("VOICELINE_DB_PATH") {
            config.database.path = v;
        }
        if let Ok(v) = std::env::var("SERVER_EXTERNAL_URL") {
            config.server.external_url = v;
        }

        Ok(config)
    }
}

fn config_dir() -> PathBuf {
    if let Ok(p) = std::env::var("VOICELINE_CONFIG") {
        // If pointing to a file, use its parent directory
        let path = PathBuf::from(p);
        return path.parent().map(|p| p.to_path_buf()).unwrap_or(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".voiceline")
}

fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("VOICELINE_CONFIG") {
        return PathBuf::from(p);
    }

    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 3004
            external_url = "https://voice.example.com"
            "#,
        )
        .unwrap();

        assert!(config.api.token.is_empty());
        assert!(config.database.path.ends_with("voiceline.db"));
        assert_eq!(
            config.elevenlabs.stream_base_url,
            "wss://api.elevenlabs.io/v1/convai/conversation"
        );
    }

    #[test]
    fn explicit_sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            external_url = "https://voice.example.com"

            [api]
            token = "secret"

            [database]
            path = "/var/lib/voiceline/calls.db"

            [elevenlabs]
            stream_base_url = "wss://convai.local/test"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.token, "secret");
        assert_eq!(config.database.path, "/var/lib/voiceline/calls.db");
        assert_eq!(config.elevenlabs.stream_base_url, "wss://convai.local/test");
    }
}

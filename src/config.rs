use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// HTTP gateway the push collaborator listens on.
    pub push_endpoint: String,
    /// Idle window after which a typing indicator auto-expires.
    pub typing_idle: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Config {
    fn duration_ms(value: Option<String>, default_ms: u64) -> Duration {
        let ms = value
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_ms);
        Duration::from_millis(ms)
    }

    fn duration_secs(value: Option<String>, default_secs: u64) -> Duration {
        let secs = value
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_secs);
        Duration::from_secs(secs)
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let push_endpoint = env::var("PUSH_ENDPOINT")
            .unwrap_or_else(|_| "http://push-gateway:8080/v1/send".to_string());

        Ok(Self {
            port,
            database_url,
            push_endpoint,
            typing_idle: Self::duration_ms(env::var("TYPING_IDLE_MS").ok(), 2000),
            heartbeat_interval: Self::duration_secs(env::var("WS_HEARTBEAT_SECS").ok(), 5),
            client_timeout: Self::duration_secs(env::var("WS_CLIENT_TIMEOUT_SECS").ok(), 30),
        })
    }
}

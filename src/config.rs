use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // HMAC key for signed QR credential payloads
    pub qr_signing_key: Secret<String>,

    // Shared token scanner devices must present; unset disables the check
    // (local development only)
    pub gate_api_token: Option<Secret<String>>,

    // Cron expression for the expiry sweep job
    pub expiry_sweep_schedule: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            qr_signing_key: Secret::new(config.get("qr_signing_key")?),

            gate_api_token: config
                .get::<String>("gate_api_token")
                .ok()
                .map(Secret::new),

            expiry_sweep_schedule: config
                .get("expiry_sweep_schedule")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
        })
    }
}

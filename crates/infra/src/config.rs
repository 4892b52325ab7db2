use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub database_path: String,
    pub slack_base_url: String,
    pub slack_bot_token: String,
    pub slack_bot_user_id: String,
    pub fallback_channel_id: String,
    pub intercom_base_url: String,
    pub intercom_access_token: String,
    pub intercom_admin_id: String,
    pub intercom_actor_type: String,
    pub http_timeout_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "sqlite")?
            .set_default("database_path", "data/threadline.db")?
            .set_default("slack_base_url", "https://slack.com/api")?
            .set_default("slack_bot_token", "")?
            .set_default("slack_bot_user_id", "")?
            .set_default("fallback_channel_id", "")?
            .set_default("intercom_base_url", "https://api.intercom.io")?
            .set_default("intercom_access_token", "")?
            .set_default("intercom_admin_id", "")?
            .set_default("intercom_actor_type", "admin")?
            .set_default("http_timeout_ms", 10_000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

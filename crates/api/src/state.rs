use std::sync::Arc;

use threadline_domain::mapping::InMemoryMappingStore;
use threadline_domain::ports::gateways::{ChatGateway, SupportGateway};
use threadline_domain::ports::store::MappingStore;
use threadline_domain::relay::{InboundRelay, OutboundRelay};
use threadline_infra::config::AppConfig;
use threadline_infra::intercom::IntercomClient;
use threadline_infra::slack::SlackClient;
use threadline_infra::store::SqliteMappingStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub inbound: InboundRelay,
    pub outbound: OutboundRelay,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn MappingStore> = match config.data_backend.as_str() {
            "memory" => Arc::new(InMemoryMappingStore::default()),
            "sqlite" => Arc::new(SqliteMappingStore::open(&config.database_path)?),
            other => anyhow::bail!("unsupported data backend: {other}"),
        };
        let support = Arc::new(IntercomClient::from_config(&config));
        let chat = Arc::new(SlackClient::from_config(&config));
        Ok(Self::with_collaborators(config, store, support, chat))
    }

    /// Wires the relays around explicit collaborators. Tests use this to
    /// substitute fakes for the upstream clients.
    pub fn with_collaborators(
        config: AppConfig,
        store: Arc<dyn MappingStore>,
        support: Arc<dyn SupportGateway>,
        chat: Arc<dyn ChatGateway>,
    ) -> Self {
        let inbound = InboundRelay::new(support, store.clone(), config.slack_bot_user_id.clone());
        let outbound = OutboundRelay::new(chat, store, config.fallback_channel_id.clone());
        Self {
            config: Arc::new(config),
            inbound,
            outbound,
        }
    }
}

use crate::sfu::{
    ForwardingEngine, ForwardingOptions, Registry, SessionFactory, SignalingHandshake,
    WebRtcSessionFactory,
};
use hub_protocol::IceServer;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    /// Directory served at `/`
    pub static_dir: String,
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<TurnServer>,
    /// Upper bound on ICE candidate gathering during a join
    pub gather_timeout_ms: u64,
    /// A subscriber write slower than this drops the subscriber's link
    pub write_timeout_ms: u64,
    pub link_queue_capacity: usize,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TurnServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            static_dir: "./public".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
            gather_timeout_ms: 10_000,
            write_timeout_ms: 500,
            link_queue_capacity: 256,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Defaults, then an optional `hub.toml`, then `HUB_*` environment
    /// variables (`.env` is honored).
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("hub").required(false))
            .add_source(
                config::Environment::with_prefix("HUB")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stun_servers"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// STUN entries first, then TURN, as handed to both the hub's own peer
    /// connections and the browser client.
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let stun = self.stun_servers.iter().map(|url| IceServer {
            urls: vec![url.clone()],
            username: None,
            credential: None,
        });
        let turn = self.turn_servers.iter().map(|turn| IceServer {
            urls: vec![turn.url.clone()],
            username: Some(turn.username.clone()),
            credential: Some(turn.credential.clone()),
        });
        stun.chain(turn).collect()
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_millis(self.gather_timeout_ms)
    }

    pub fn forwarding_options(&self) -> ForwardingOptions {
        ForwardingOptions {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            queue_capacity: self.link_queue_capacity,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub engine: Arc<ForwardingEngine>,
    pub handshake: Arc<SignalingHandshake>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let factory = WebRtcSessionFactory::new(&config.ice_servers())?;
        Ok(Self::with_factory(config, Arc::new(factory)))
    }

    /// Build the state around a custom session factory
    pub fn with_factory(config: Config, factory: Arc<dyn SessionFactory>) -> Self {
        let registry = Arc::new(Registry::new());
        let engine = Arc::new(ForwardingEngine::new(
            registry.clone(),
            config.forwarding_options(),
        ));
        let handshake = Arc::new(SignalingHandshake::new(
            factory,
            registry.clone(),
            engine.clone(),
            config.gather_timeout(),
        ));

        Self {
            config,
            registry,
            engine,
            handshake,
        }
    }
}

use conduit_dns_application::ports::{ResponseCache, UpstreamExchanger};
use conduit_dns_application::{ForwardingEngine, QueryEvent, QueryEventEmitter};
use conduit_dns_domain::Config;
use conduit_dns_infrastructure::cache::DnsCache;
use conduit_dns_infrastructure::server::DnsServer;
use conduit_dns_infrastructure::upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wires the cache, upstream client, and engine together and starts the
/// listeners.
pub async fn start_server(config: &Config) -> anyhow::Result<DnsServer> {
    let (events, event_rx) = QueryEventEmitter::new_enabled();
    tokio::spawn(consume_events(event_rx));

    let cache = config
        .cache
        .enabled
        .then(|| Arc::new(DnsCache::new(&config.cache)) as Arc<dyn ResponseCache>);
    let upstream: Arc<dyn UpstreamExchanger> =
        Arc::new(UpstreamClient::from_config(&config.upstream, events.clone())?);

    let engine = Arc::new(ForwardingEngine::new(
        cache,
        upstream,
        Duration::from_millis(config.upstream.query_timeout_ms),
        events,
    ));
    let server = DnsServer::start(engine, &config.server).await?;
    Ok(server)
}

async fn consume_events(mut events: mpsc::UnboundedReceiver<QueryEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            QueryEvent::Received { key } => debug!(%key, "query received"),
            QueryEvent::CacheHit { key, age_secs } => debug!(%key, age_secs, "cache hit"),
            QueryEvent::CacheMiss { key } => debug!(%key, "cache miss"),
            QueryEvent::UpstreamFailure { key, detail } => {
                warn!(%key, %detail, "upstream failure")
            }
            QueryEvent::Timeout { key } => warn!(%key, "query timed out"),
            QueryEvent::SpoofDropped { key, reason } => {
                warn!(%key, %reason, "dropped suspicious upstream reply")
            }
        }
    }
}

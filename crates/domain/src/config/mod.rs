mod cache;
mod errors;
mod logging;
mod root;
mod server;
mod upstream;

pub use cache::CacheConfig;
pub use errors::ConfigError;
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
pub use upstream::{TransportPreference, UpstreamConfig, UpstreamTargetConfig};

//! Conduit DNS Infrastructure Layer
//!
//! Adapters behind the application ports: the response cache, the upstream
//! transports and failover client, and the UDP/TCP listeners.
pub mod cache;
pub mod server;
pub mod upstream;

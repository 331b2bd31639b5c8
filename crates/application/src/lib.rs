//! Conduit DNS Application Layer
//!
//! The forwarding engine and its collaborators, expressed against ports so
//! the infrastructure layer can supply transports and the cache.
pub mod correlator;
pub mod engine;
pub mod events;
pub mod ports;

pub use correlator::{PendingQueryTable, QueryOutcome};
pub use engine::ForwardingEngine;
pub use events::{QueryEvent, QueryEventEmitter};

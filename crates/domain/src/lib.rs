//! Conduit DNS Domain Layer
pub mod config;
pub mod errors;
pub mod message;
pub mod query_key;
pub mod record;
pub mod wire;

pub use config::{CliOverrides, Config};
pub use errors::DomainError;
pub use message::{DnsMessage, Flags, Opcode, Question, Rcode};
pub use query_key::QueryKey;
pub use record::{RData, RecordClass, RecordType, ResourceRecord};

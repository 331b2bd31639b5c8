mod cache;
mod upstream;

pub use cache::{CachedResponse, ResponseCache};
pub use upstream::{UpstreamAnswer, UpstreamExchanger};

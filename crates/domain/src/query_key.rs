use crate::message::Question;
use crate::record::{RecordClass, RecordType};
use std::fmt;
use std::sync::Arc;

/// Key identifying a query for caching and in-flight deduplication:
/// lowercased qname plus qtype and qclass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub qname: Arc<str>,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl QueryKey {
    pub fn new(qname: &str, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            qname: Arc::from(qname.to_ascii_lowercase()),
            qtype,
            qclass,
        }
    }
}

impl From<&Question> for QueryKey {
    fn from(question: &Question) -> Self {
        Self::new(&question.name, question.qtype, question.qclass)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.qname, self.qtype, self.qclass)
    }
}

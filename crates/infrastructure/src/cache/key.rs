use compact_str::CompactString;
use conduit_dns_domain::record::{RecordClass, RecordType};
use conduit_dns_domain::QueryKey;
use std::hash::{Hash, Hasher};

/// Cache map key. `CompactString` keeps names up to 24 bytes inline, which
/// covers the vast majority of query names, so building a lookup key does
/// not usually allocate.
#[derive(Clone, Debug, Eq)]
pub struct CacheKey {
    pub qname: CompactString,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl CacheKey {
    #[inline]
    pub fn new(qname: &str, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            qname: CompactString::from(qname),
            qtype,
            qclass,
        }
    }
}

impl From<&QueryKey> for CacheKey {
    #[inline]
    fn from(key: &QueryKey) -> Self {
        Self::new(&key.qname, key.qtype, key.qclass)
    }
}

impl Hash for CacheKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qname.as_str().hash(state);
        self.qtype.to_u16().hash(state);
        self.qclass.to_u16().hash(state);
    }
}

impl PartialEq for CacheKey {
    #[inline]
    fn eq(&self, other: &CacheKey) -> bool {
        self.qtype == other.qtype && self.qclass == other.qclass && self.qname == other.qname
    }
}

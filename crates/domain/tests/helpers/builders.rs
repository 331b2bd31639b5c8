use conduit_dns_domain::message::{DnsMessage, Question};
use conduit_dns_domain::record::{RData, RecordClass, RecordType, ResourceRecord};
use std::net::Ipv4Addr;

pub fn a_question(name: &str) -> Question {
    Question::new(name, RecordType::A, RecordClass::IN)
}

pub fn a_record(name: &str, ttl: u32, addr: [u8; 4]) -> ResourceRecord {
    ResourceRecord::new(
        name,
        RecordType::A,
        RecordClass::IN,
        ttl,
        RData::A(Ipv4Addr::from(addr)),
    )
}

pub fn soa_record(zone: &str, minimum: u32) -> ResourceRecord {
    ResourceRecord::new(
        zone,
        RecordType::SOA,
        RecordClass::IN,
        minimum,
        RData::Soa {
            mname: format!("ns1.{zone}"),
            rname: format!("hostmaster.{zone}"),
            serial: 2024_01_01,
            refresh: 7200,
            retry: 900,
            expire: 1_209_600,
            minimum,
        },
    )
}

pub fn answered_query(name: &str, ttl: u32, addr: [u8; 4]) -> DnsMessage {
    let mut message = DnsMessage::query(0x2B1D, a_question(name));
    message.flags.response = true;
    message.flags.recursion_available = true;
    message.answers.push(a_record(name, ttl, addr));
    message
}

use crate::record::{RecordClass, RecordType, ResourceRecord};

/// Fixed DNS header size (RFC 1035 §4.1.1).
pub const HEADER_LEN: usize = 12;

/// Maximum UDP payload without EDNS0.
pub const MAX_UDP_PAYLOAD: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Opcode {
    #[default]
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl Opcode {
    pub fn to_u4(&self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(v) => *v & 0x0F,
        }
    }

    pub fn from_u4(value: u8) -> Self {
        match value & 0x0F {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => Opcode::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rcode {
    #[default]
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Unknown(u8),
}

impl Rcode {
    pub fn to_u4(&self) -> u8 {
        match self {
            Rcode::NoError => 0,
            Rcode::FormErr => 1,
            Rcode::ServFail => 2,
            Rcode::NxDomain => 3,
            Rcode::NotImp => 4,
            Rcode::Refused => 5,
            Rcode::Unknown(v) => *v & 0x0F,
        }
    }

    pub fn from_u4(value: u8) -> Self {
        match value & 0x0F {
            0 => Rcode::NoError,
            1 => Rcode::FormErr,
            2 => Rcode::ServFail,
            3 => Rcode::NxDomain,
            4 => Rcode::NotImp,
            5 => Rcode::Refused,
            other => Rcode::Unknown(other),
        }
    }
}

/// The 16 flag bits of the DNS header, unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub response: bool,
    pub opcode: Opcode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    /// Reserved Z bits, preserved verbatim.
    pub z: u8,
    pub rcode: Rcode,
}

impl Flags {
    pub fn to_u16(&self) -> u16 {
        let mut bits = 0u16;
        if self.response {
            bits |= 1 << 15;
        }
        bits |= (self.opcode.to_u4() as u16) << 11;
        if self.authoritative {
            bits |= 1 << 10;
        }
        if self.truncated {
            bits |= 1 << 9;
        }
        if self.recursion_desired {
            bits |= 1 << 8;
        }
        if self.recursion_available {
            bits |= 1 << 7;
        }
        bits |= ((self.z & 0x07) as u16) << 4;
        bits |= self.rcode.to_u4() as u16;
        bits
    }

    pub fn from_u16(bits: u16) -> Self {
        Self {
            response: bits & (1 << 15) != 0,
            opcode: Opcode::from_u4((bits >> 11) as u8),
            authoritative: bits & (1 << 10) != 0,
            truncated: bits & (1 << 9) != 0,
            recursion_desired: bits & (1 << 8) != 0,
            recursion_available: bits & (1 << 7) != 0,
            z: ((bits >> 4) & 0x07) as u8,
            rcode: Rcode::from_u4(bits as u8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass,
        }
    }

    /// Case-insensitive question comparison (RFC 1035 §2.3.3 name matching).
    pub fn matches(&self, other: &Question) -> bool {
        self.qtype == other.qtype
            && self.qclass == other.qclass
            && self.name.eq_ignore_ascii_case(&other.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl DnsMessage {
    /// A recursive query for a single question.
    pub fn query(id: u16, question: Question) -> Self {
        Self {
            id,
            flags: Flags {
                recursion_desired: true,
                ..Flags::default()
            },
            questions: vec![question],
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// An empty response to this message with the given rcode. Echoes the
    /// question section and the client's RD flag; sets QR and RA.
    pub fn response_with_rcode(&self, rcode: Rcode) -> Self {
        Self {
            id: self.id,
            flags: Flags {
                response: true,
                opcode: self.flags.opcode,
                recursion_desired: self.flags.recursion_desired,
                recursion_available: true,
                rcode,
                ..Flags::default()
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Smallest TTL across the answer section, if any answers exist.
    pub fn min_answer_ttl(&self) -> Option<u32> {
        self.answers.iter().map(|r| r.ttl).min()
    }

    /// UDP payload limit advertised by the sender: the class field of an
    /// EDNS0 OPT record in the additional section, floored at 512.
    pub fn payload_limit(&self) -> usize {
        self.additionals
            .iter()
            .find(|r| r.record_type == RecordType::OPT)
            .map(|r| (r.class.to_u16() as usize).max(MAX_UDP_PAYLOAD))
            .unwrap_or(MAX_UDP_PAYLOAD)
    }

    /// Subtracts `elapsed_secs` from every record TTL, flooring at zero.
    /// Used when answering from cache.
    pub fn decay_ttls(&mut self, elapsed_secs: u32) {
        for record in self
            .answers
            .iter_mut()
            .chain(self.authorities.iter_mut())
            .chain(self.additionals.iter_mut())
        {
            if record.record_type != RecordType::OPT {
                record.ttl = record.ttl.saturating_sub(elapsed_secs);
            }
        }
    }
}

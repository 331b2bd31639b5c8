use super::name::decode_name;
use crate::errors::DomainError;
use crate::message::{DnsMessage, Flags, Question, HEADER_LEN};
use crate::record::{RData, RecordClass, RecordType, ResourceRecord};

/// Decodes a DNS message from its wire representation.
///
/// Fails with `MalformedMessage` when the buffer is shorter than the fixed
/// header, a name violates the compression or length rules, or the declared
/// section counts exceed what the buffer actually holds.
pub fn decode(buf: &[u8]) -> Result<DnsMessage, DomainError> {
    if buf.len() < HEADER_LEN {
        return Err(DomainError::MalformedMessage(format!(
            "message shorter than the {HEADER_LEN}-byte header: {} bytes",
            buf.len()
        )));
    }

    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let flags = Flags::from_u16(u16::from_be_bytes([buf[2], buf[3]]));
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]);
    let ancount = u16::from_be_bytes([buf[6], buf[7]]);
    let nscount = u16::from_be_bytes([buf[8], buf[9]]);
    let arcount = u16::from_be_bytes([buf[10], buf[11]]);

    let mut pos = HEADER_LEN;

    let mut questions = Vec::with_capacity(qdcount as usize);
    for _ in 0..qdcount {
        questions.push(decode_question(buf, &mut pos)?);
    }

    let answers = decode_records(buf, &mut pos, ancount, "answer")?;
    let authorities = decode_records(buf, &mut pos, nscount, "authority")?;
    let additionals = decode_records(buf, &mut pos, arcount, "additional")?;

    Ok(DnsMessage {
        id,
        flags,
        questions,
        answers,
        authorities,
        additionals,
    })
}

fn decode_question(buf: &[u8], pos: &mut usize) -> Result<Question, DomainError> {
    let name = decode_name(buf, pos)?;
    let qtype = RecordType::from_u16(read_u16(buf, pos)?);
    let qclass = RecordClass::from_u16(read_u16(buf, pos)?);
    Ok(Question::new(name, qtype, qclass))
}

fn decode_records(
    buf: &[u8],
    pos: &mut usize,
    count: u16,
    section: &str,
) -> Result<Vec<ResourceRecord>, DomainError> {
    let mut records = Vec::with_capacity(count as usize);
    for index in 0..count {
        records.push(decode_record(buf, pos).map_err(|e| {
            DomainError::MalformedMessage(format!(
                "{section} record {index} of {count}: {e}"
            ))
        })?);
    }
    Ok(records)
}

fn decode_record(buf: &[u8], pos: &mut usize) -> Result<ResourceRecord, DomainError> {
    let name = decode_name(buf, pos)?;
    let record_type = RecordType::from_u16(read_u16(buf, pos)?);
    let class = RecordClass::from_u16(read_u16(buf, pos)?);
    let ttl = read_u32(buf, pos)?;
    let rdlength = read_u16(buf, pos)? as usize;

    let rdata_start = *pos;
    let rdata_end = rdata_start
        .checked_add(rdlength)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| {
            DomainError::MalformedMessage("record data runs past end of message".to_string())
        })?;

    let rdata = decode_rdata(buf, rdata_start, rdata_end, record_type)?;
    *pos = rdata_end;

    Ok(ResourceRecord::new(name, record_type, class, ttl, rdata))
}

/// Decodes RDATA for the types the forwarder models; anything else is kept
/// as opaque bytes. Names embedded in RDATA may be compressed and are
/// resolved against the whole message.
fn decode_rdata(
    buf: &[u8],
    start: usize,
    end: usize,
    record_type: RecordType,
) -> Result<RData, DomainError> {
    let raw = &buf[start..end];
    let mut pos = start;

    let rdata = match record_type {
        RecordType::A => {
            let octets: [u8; 4] = raw
                .try_into()
                .map_err(|_| malformed("A record data is not 4 bytes"))?;
            RData::A(octets.into())
        }
        RecordType::AAAA => {
            let octets: [u8; 16] = raw
                .try_into()
                .map_err(|_| malformed("AAAA record data is not 16 bytes"))?;
            RData::Aaaa(octets.into())
        }
        RecordType::CNAME => RData::Cname(decode_bounded_name(buf, &mut pos, end)?),
        RecordType::NS => RData::Ns(decode_bounded_name(buf, &mut pos, end)?),
        RecordType::PTR => RData::Ptr(decode_bounded_name(buf, &mut pos, end)?),
        RecordType::MX => {
            let preference = read_u16(buf, &mut pos)?;
            let exchange = decode_bounded_name(buf, &mut pos, end)?;
            RData::Mx {
                preference,
                exchange,
            }
        }
        RecordType::TXT => {
            let mut strings = Vec::new();
            let mut cursor = 0usize;
            while cursor < raw.len() {
                let len = raw[cursor] as usize;
                cursor += 1;
                let chunk = raw
                    .get(cursor..cursor + len)
                    .ok_or_else(|| malformed("TXT character-string runs past record data"))?;
                strings.push(chunk.to_vec());
                cursor += len;
            }
            RData::Txt(strings)
        }
        RecordType::SOA => {
            let mname = decode_bounded_name(buf, &mut pos, end)?;
            let rname = decode_bounded_name(buf, &mut pos, end)?;
            if pos + 20 > end {
                return Err(malformed("SOA record data too short"));
            }
            RData::Soa {
                mname,
                rname,
                serial: read_u32(buf, &mut pos)?,
                refresh: read_u32(buf, &mut pos)?,
                retry: read_u32(buf, &mut pos)?,
                expire: read_u32(buf, &mut pos)?,
                minimum: read_u32(buf, &mut pos)?,
            }
        }
        _ => RData::Opaque(raw.to_vec()),
    };

    Ok(rdata)
}

/// Decodes a name inside RDATA, ensuring the uncompressed portion stays
/// within the record's data bounds.
fn decode_bounded_name(buf: &[u8], pos: &mut usize, end: usize) -> Result<String, DomainError> {
    let name = decode_name(buf, pos)?;
    if *pos > end {
        return Err(malformed("name runs past record data"));
    }
    Ok(name)
}

fn read_u16(buf: &[u8], pos: &mut usize) -> Result<u16, DomainError> {
    let bytes = buf
        .get(*pos..*pos + 2)
        .ok_or_else(|| malformed("unexpected end of message"))?;
    *pos += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, DomainError> {
    let bytes = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| malformed("unexpected end of message"))?;
    *pos += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn malformed(detail: &str) -> DomainError {
    DomainError::MalformedMessage(detail.to_string())
}

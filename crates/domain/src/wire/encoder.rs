use super::name::encode_name;
use crate::errors::DomainError;
use crate::message::{DnsMessage, Question, HEADER_LEN};
use crate::record::{RData, ResourceRecord};

/// Serializes a message to wire format with uncompressed names.
pub fn encode(message: &DnsMessage) -> Result<Vec<u8>, DomainError> {
    let mut out = Vec::with_capacity(HEADER_LEN + 64);

    out.extend_from_slice(&message.id.to_be_bytes());
    out.extend_from_slice(&message.flags.to_u16().to_be_bytes());
    out.extend_from_slice(&section_count(message.questions.len())?.to_be_bytes());
    out.extend_from_slice(&section_count(message.answers.len())?.to_be_bytes());
    out.extend_from_slice(&section_count(message.authorities.len())?.to_be_bytes());
    out.extend_from_slice(&section_count(message.additionals.len())?.to_be_bytes());

    for question in &message.questions {
        encode_question(question, &mut out)?;
    }
    for record in &message.answers {
        encode_record(record, &mut out)?;
    }
    for record in &message.authorities {
        encode_record(record, &mut out)?;
    }
    for record in &message.additionals {
        encode_record(record, &mut out)?;
    }

    Ok(out)
}

/// Serializes a response for UDP delivery, honoring the client's payload
/// limit. When the full encoding does not fit, records are dropped from the
/// tail (additionals, then authorities, then answers) and the TC bit is set
/// so the client retries over TCP.
pub fn encode_for_udp(message: &DnsMessage, limit: usize) -> Result<Vec<u8>, DomainError> {
    let bytes = encode(message)?;
    if bytes.len() <= limit {
        return Ok(bytes);
    }

    let mut reduced = message.clone();
    reduced.flags.truncated = true;

    loop {
        if reduced.additionals.pop().is_none()
            && reduced.authorities.pop().is_none()
            && reduced.answers.pop().is_none()
        {
            break;
        }
        let bytes = encode(&reduced)?;
        if bytes.len() <= limit {
            return Ok(bytes);
        }
    }

    // Header plus question always fits in 512 bytes given the 255-octet
    // name bound, so this is unreachable for any decodable query.
    encode(&reduced)
}

fn encode_question(question: &Question, out: &mut Vec<u8>) -> Result<(), DomainError> {
    encode_name(&question.name, out)?;
    out.extend_from_slice(&question.qtype.to_u16().to_be_bytes());
    out.extend_from_slice(&question.qclass.to_u16().to_be_bytes());
    Ok(())
}

fn encode_record(record: &ResourceRecord, out: &mut Vec<u8>) -> Result<(), DomainError> {
    encode_name(&record.name, out)?;
    out.extend_from_slice(&record.record_type.to_u16().to_be_bytes());
    out.extend_from_slice(&record.class.to_u16().to_be_bytes());
    out.extend_from_slice(&record.ttl.to_be_bytes());

    let rdlength_at = out.len();
    out.extend_from_slice(&[0, 0]);
    encode_rdata(&record.rdata, out)?;

    let rdlength = out.len() - rdlength_at - 2;
    if rdlength > u16::MAX as usize {
        return Err(DomainError::MessageTooLarge { size: rdlength });
    }
    out[rdlength_at..rdlength_at + 2].copy_from_slice(&(rdlength as u16).to_be_bytes());
    Ok(())
}

fn encode_rdata(rdata: &RData, out: &mut Vec<u8>) -> Result<(), DomainError> {
    match rdata {
        RData::A(addr) => out.extend_from_slice(&addr.octets()),
        RData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
        RData::Cname(name) | RData::Ns(name) | RData::Ptr(name) => {
            encode_name(name, out)?;
        }
        RData::Mx {
            preference,
            exchange,
        } => {
            out.extend_from_slice(&preference.to_be_bytes());
            encode_name(exchange, out)?;
        }
        RData::Txt(strings) => {
            for chunk in strings {
                if chunk.len() > 255 {
                    return Err(DomainError::MalformedMessage(
                        "TXT character-string longer than 255 bytes".to_string(),
                    ));
                }
                out.push(chunk.len() as u8);
                out.extend_from_slice(chunk);
            }
        }
        RData::Soa {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            encode_name(mname, out)?;
            encode_name(rname, out)?;
            out.extend_from_slice(&serial.to_be_bytes());
            out.extend_from_slice(&refresh.to_be_bytes());
            out.extend_from_slice(&retry.to_be_bytes());
            out.extend_from_slice(&expire.to_be_bytes());
            out.extend_from_slice(&minimum.to_be_bytes());
        }
        RData::Opaque(bytes) => out.extend_from_slice(bytes),
    }
    Ok(())
}

fn section_count(len: usize) -> Result<u16, DomainError> {
    u16::try_from(len).map_err(|_| DomainError::MessageTooLarge { size: len })
}

use crate::errors::DomainError;

/// Maximum length of a single label (RFC 1035 §2.3.4).
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum wire-format length of a domain name, including length octets
/// and the terminating root octet.
pub const MAX_NAME_LEN: usize = 255;

const POINTER_MASK: u8 = 0xC0;

/// Decodes a possibly-compressed domain name starting at `*pos`.
///
/// `*pos` is advanced past the name as it appears at the original position
/// (a pointer consumes two octets regardless of where it leads). Every
/// pointer must target an offset strictly before the pointer itself, and
/// successive targets must be strictly decreasing, so chains always
/// terminate.
pub fn decode_name(buf: &[u8], pos: &mut usize) -> Result<String, DomainError> {
    let mut name = String::new();
    let mut cursor = *pos;
    let mut wire_len = 0usize;
    let mut jumped = false;
    let mut last_target = usize::MAX;

    loop {
        let len_octet = *buf
            .get(cursor)
            .ok_or_else(|| malformed("name runs past end of message"))?;

        if len_octet & POINTER_MASK == POINTER_MASK {
            let low = *buf
                .get(cursor + 1)
                .ok_or_else(|| malformed("truncated compression pointer"))?;
            let target = (((len_octet & 0x3F) as usize) << 8) | low as usize;

            if target >= cursor || target >= last_target {
                return Err(malformed("compression pointer does not point backwards"));
            }

            if !jumped {
                *pos = cursor + 2;
                jumped = true;
            }
            last_target = target;
            cursor = target;
        } else if len_octet & POINTER_MASK != 0 {
            return Err(malformed("unsupported label type"));
        } else if len_octet == 0 {
            if !jumped {
                *pos = cursor + 1;
            }
            wire_len += 1;
            if wire_len > MAX_NAME_LEN {
                return Err(malformed("name exceeds 255 octets"));
            }
            return Ok(name);
        } else {
            let label_len = len_octet as usize;
            wire_len += label_len + 1;
            if wire_len >= MAX_NAME_LEN {
                return Err(malformed("name exceeds 255 octets"));
            }

            let label = buf
                .get(cursor + 1..cursor + 1 + label_len)
                .ok_or_else(|| malformed("label runs past end of message"))?;
            let label = std::str::from_utf8(label)
                .map_err(|_| malformed("label contains invalid UTF-8"))?;

            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(label);
            cursor += 1 + label_len;
        }
    }
}

/// Appends the uncompressed wire encoding of `name` to `out`. The empty
/// string and `"."` both encode the root name.
pub fn encode_name(name: &str, out: &mut Vec<u8>) -> Result<(), DomainError> {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        out.push(0);
        return Ok(());
    }

    let mut wire_len = 1usize;
    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err(DomainError::InvalidDomainName(format!(
                "empty label in '{name}'"
            )));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DomainError::InvalidDomainName(format!(
                "label longer than 63 octets in '{name}'"
            )));
        }
        wire_len += label.len() + 1;
        if wire_len > MAX_NAME_LEN {
            return Err(DomainError::InvalidDomainName(format!(
                "name '{name}' exceeds 255 octets"
            )));
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    Ok(())
}

fn malformed(detail: &str) -> DomainError {
    DomainError::MalformedMessage(detail.to_string())
}

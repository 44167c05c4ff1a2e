//! Credential record codec.
//!
//! The vault stores credentials as an offset-table record: a header of five
//! little-endian u16 offsets (service, login, description, third, password)
//! followed by the field area. Offsets are counted in UTF-16 code units
//! relative to the field area; the service field is fixed at offset 0 and
//! `65535` marks a field as absent. Fields are UTF-16LE with a 2-byte NUL
//! terminator, laid out back-to-back in header order.
//!
//! Lookup queries use the same scheme restricted to service and login, with
//! a 4-byte header.

use bytes::Bytes;

/// Offset sentinel marking an absent field.
pub const ABSENT_FIELD: u16 = 65535;

/// Record header size: five u16 offset slots.
const RECORD_HEADER_SIZE: usize = 10;

/// Query header size: two u16 offset slots.
const QUERY_HEADER_SIZE: usize = 4;

/// A decoded credential record.
///
/// `service` is the caller's lookup string; the wire format does not echo
/// it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub service: String,
    pub login: Option<String>,
    pub description: Option<String>,
    pub third: Option<String>,
    pub password: Option<String>,
}

/// UTF-16LE bytes of `s` plus the 2-byte NUL terminator.
fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Offset slot value: byte offset in code units, or the absent sentinel.
fn slot(field: Option<&Vec<u8>>, byte_offset: usize) -> [u8; 2] {
    match field {
        Some(_) => ((byte_offset / 2) as u16).to_le_bytes(),
        None => ABSENT_FIELD.to_le_bytes(),
    }
}

/// Encode a full credential record for a store request.
pub fn encode_credentials(
    service: &str,
    login: Option<&str>,
    description: Option<&str>,
    third: Option<&str>,
    password: Option<&str>,
) -> Bytes {
    let service = utf16z(service);
    let login = login.map(utf16z);
    let description = description.map(utf16z);
    let third = third.map(utf16z);
    let password = password.map(utf16z);

    let login_off = service.len();
    let description_off = login_off + login.as_ref().map_or(0, Vec::len);
    let third_off = description_off + description.as_ref().map_or(0, Vec::len);
    let password_off = third_off + third.as_ref().map_or(0, Vec::len);
    let total = password_off + password.as_ref().map_or(0, Vec::len);

    let mut out = Vec::with_capacity(RECORD_HEADER_SIZE + total);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&slot(login.as_ref(), login_off));
    out.extend_from_slice(&slot(description.as_ref(), description_off));
    out.extend_from_slice(&slot(third.as_ref(), third_off));
    out.extend_from_slice(&slot(password.as_ref(), password_off));
    out.extend_from_slice(&service);
    for field in [login, description, third, password].into_iter().flatten() {
        out.extend_from_slice(&field);
    }
    out.into()
}

/// Encode a lookup query for `service` and an optional login.
pub fn encode_query(service: &str, login: Option<&str>) -> Bytes {
    let service = utf16z(service);
    let login = login.map(utf16z);

    let mut out = Vec::with_capacity(QUERY_HEADER_SIZE + service.len());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&slot(login.as_ref(), service.len()));
    out.extend_from_slice(&service);
    if let Some(login) = login {
        out.extend_from_slice(&login);
    }
    out.into()
}

/// Read one offset slot and its NUL-terminated UTF-16LE field.
///
/// Outer `None` = malformed record; inner `None` = field absent.
fn read_field(data: &[u8], slot: usize) -> Option<Option<String>> {
    let off = u16::from_le_bytes([*data.get(slot)?, *data.get(slot + 1)?]);
    if off == ABSENT_FIELD {
        return Some(None);
    }
    let start = off as usize * 2 + RECORD_HEADER_SIZE;
    let rest = data.get(start..)?;
    let mut units = Vec::new();
    let mut pairs = rest.chunks_exact(2);
    loop {
        let pair = pairs.next()?;
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Some(Some(String::from_utf16(&units).ok()?))
}

/// Decode a credential record from a lookup answer.
///
/// Any out-of-bounds offset, missing terminator, or invalid UTF-16 yields
/// `None` rather than a partial record.
pub fn decode_credentials(service: &str, data: &[u8]) -> Option<Credentials> {
    Some(Credentials {
        service: service.to_string(),
        login: read_field(data, 2)?,
        description: read_field(data, 4)?,
        third: read_field(data, 6)?,
        password: read_field(data, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_fields() {
        let data = encode_credentials(
            "example.org",
            Some("alice"),
            Some("mail account"),
            Some("extra"),
            Some("hunter2"),
        );
        let creds = decode_credentials("example.org", &data).unwrap();
        assert_eq!(creds.service, "example.org");
        assert_eq!(creds.login.as_deref(), Some("alice"));
        assert_eq!(creds.description.as_deref(), Some("mail account"));
        assert_eq!(creds.third.as_deref(), Some("extra"));
        assert_eq!(creds.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_roundtrip_field_subsets() {
        let fields = ["alice", "desc", "third", "pw"];
        for mask in 0..16u32 {
            let pick = |bit: u32| (mask & (1 << bit) != 0).then_some(fields[bit as usize]);
            let data = encode_credentials("svc", pick(0), pick(1), pick(2), pick(3));
            let creds = decode_credentials("svc", &data).unwrap();
            assert_eq!(creds.login.as_deref(), pick(0), "mask {mask:#06b}");
            assert_eq!(creds.description.as_deref(), pick(1));
            assert_eq!(creds.third.as_deref(), pick(2));
            assert_eq!(creds.password.as_deref(), pick(3));
        }
    }

    #[test]
    fn test_absent_login_uses_sentinel() {
        let data = encode_credentials("svc", None, None, None, Some("pw"));
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), ABSENT_FIELD);
    }

    #[test]
    fn test_offsets_skip_absent_fields() {
        // password directly follows service when the middle fields are absent
        let data = encode_credentials("ab", None, None, None, Some("pw"));
        let service_units = 3; // 'a' 'b' NUL
        let pw_slot = u16::from_le_bytes([data[8], data[9]]);
        assert_eq!(pw_slot as usize, service_units);
    }

    #[test]
    fn test_non_ascii_fields() {
        let data = encode_credentials("müller.de", Some("änne"), None, None, Some("päßwörd"));
        let creds = decode_credentials("müller.de", &data).unwrap();
        assert_eq!(creds.login.as_deref(), Some("änne"));
        assert_eq!(creds.password.as_deref(), Some("päßwörd"));
    }

    #[test]
    fn test_query_without_login() {
        let data = encode_query("abc", None);
        assert_eq!(&data[0..2], &0u16.to_le_bytes());
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), ABSENT_FIELD);
        let expected: Vec<u8> = "abc"
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        assert_eq!(&data[4..], &expected[..]);
    }

    #[test]
    fn test_query_with_login() {
        let data = encode_query("ab", Some("cd"));
        // login offset = 3 code units (service + NUL)
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 3);
        assert_eq!(data.len(), 4 + 6 + 6);
    }

    #[test]
    fn test_out_of_bounds_offset_is_none() {
        let mut data = encode_credentials("svc", Some("alice"), None, None, None).to_vec();
        // point the login slot far past the record end
        data[2..4].copy_from_slice(&500u16.to_le_bytes());
        assert!(decode_credentials("svc", &data).is_none());
    }

    #[test]
    fn test_missing_terminator_is_none() {
        let mut data = encode_credentials("svc", Some("alice"), None, None, None).to_vec();
        let len = data.len();
        data.truncate(len - 2); // drop the final NUL
        assert!(decode_credentials("svc", &data).is_none());
    }

    #[test]
    fn test_truncated_header_is_none() {
        assert!(decode_credentials("svc", &[0u8; 6]).is_none());
    }
}

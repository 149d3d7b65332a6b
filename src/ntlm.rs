use std::fmt;

use crate::flags::NtlmFlags;


pub const NTLMSSP_SIGNATURE: [u8; 8] = *b"NTLMSSP\0";

const MESSAGE_HEADER_LEN: usize
    = 8 // signature
    + 4 // message type
    ;

/// Offset of the target name within a challenge message.
pub const CHALLENGE_FIXED_LEN: usize
    = MESSAGE_HEADER_LEN
    + 8 // target name secbuffer
    + 4 // flags
    + 8 // server challenge
    + 8 // reserved
    + 8 // target info fields
    ;

pub const AUTHENTICATE_FIXED_LEN: usize
    = MESSAGE_HEADER_LEN
    + 8 // LM response secbuffer
    + 8 // NT response secbuffer
    + 8 // domain name secbuffer
    + 8 // user name secbuffer
    + 8 // workstation name secbuffer
    + 8 // session key secbuffer
    + 4 // flags
    ;

const NEGOTIATE_FLAGS_END: usize = MESSAGE_HEADER_LEN + 4;
const NEGOTIATE_FIXED_LEN: usize
    = NEGOTIATE_FLAGS_END
    + 8 // supplied domain secbuffer
    + 8 // supplied workstation secbuffer
    ;


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NtlmParsingError {
    InvalidBase64(base64::DecodeError),
    ShortHeader{ expected_min_len: usize, obtained_len: usize },
    SignatureMismatch{ obtained: Vec<u8> },
    UnexpectedMessageType{ expected: NtlmMessageType, obtained: NtlmMessageType },
    OutOfRange{ offset: usize, length: usize, buffer_len: usize },
    ItemLengthNotDivisible{ expected_divisor: usize, obtained_length: usize },
    InvalidUtf16{ value: Vec<u16> },
}
impl fmt::Display for NtlmParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBase64(e)
                => write!(f, "message is not valid base64: {}", e),
            Self::ShortHeader{ expected_min_len, obtained_len }
                => write!(f, "message too short (expected at least {} bytes, obtained {})", expected_min_len, obtained_len),
            Self::SignatureMismatch{ obtained }
                => write!(f, "mismatched signature (expected {:?}, obtained {:?})", NTLMSSP_SIGNATURE, obtained),
            Self::UnexpectedMessageType{ expected, obtained }
                => write!(f, "expected a {} message, obtained {}", expected, obtained),
            Self::OutOfRange{ offset, length, buffer_len }
                => write!(f, "{} bytes at offset {} exceed the {}-byte message", length, offset, buffer_len),
            Self::ItemLengthNotDivisible{ expected_divisor, obtained_length }
                => write!(f, "item length {} not divisible by {}", obtained_length, expected_divisor),
            Self::InvalidUtf16{ value }
                => write!(f, "failed to decode value as UTF-16: {:?}", value),
        }
    }
}
impl std::error::Error for NtlmParsingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidBase64(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum NtlmStoringError {
    NonOemEncodable{ string: String },
    BufferTooLong{ length: usize },
}
impl fmt::Display for NtlmStoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonOemEncodable{ string }
                => write!(f, "failed to encode {:?} using OEM encoding", string),
            Self::BufferTooLong{ length }
                => write!(f, "{} bytes do not fit into a security buffer", length),
        }
    }
}
impl std::error::Error for NtlmStoringError {
}


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NtlmMessageType {
    Negotiate,
    Challenge,
    Authenticate,
    Other(u32),
}
impl From<u32> for NtlmMessageType {
    fn from(value: u32) -> Self {
        match value {
            0x0000_0001 => Self::Negotiate,
            0x0000_0002 => Self::Challenge,
            0x0000_0003 => Self::Authenticate,
            other => Self::Other(other),
        }
    }
}
impl From<NtlmMessageType> for u32 {
    fn from(t: NtlmMessageType) -> Self {
        match t {
            NtlmMessageType::Negotiate => 0x0000_0001,
            NtlmMessageType::Challenge => 0x0000_0002,
            NtlmMessageType::Authenticate => 0x0000_0003,
            NtlmMessageType::Other(other) => other,
        }
    }
}
impl fmt::Display for NtlmMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negotiate => write!(f, "negotiate"),
            Self::Challenge => write!(f, "challenge"),
            Self::Authenticate => write!(f, "authenticate"),
            Self::Other(t) => write!(f, "type-{}", t),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NtlmHeader {
    pub signature: [u8; 8],
    pub message_type: NtlmMessageType,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NtlmNegotiateMessage {
    pub flags: NtlmFlags,
    pub supplied_domain: String,
    pub supplied_workstation: String,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NtlmChallengeMessage {
    pub target_name: Vec<u8>,
    pub flags: NtlmFlags,
    pub server_challenge: [u8; 8],
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NtlmAuthenticateMessage {
    pub lm_response: Vec<u8>,
    pub nt_response: Vec<u8>,
    pub domain_name: String,
    pub user_name: String,
    pub workstation_name: String,
    pub session_key: Vec<u8>,
    pub flags: NtlmFlags,
}

/// (length, capacity, offset) triple locating a variable field within a message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NtlmSecurityBuffer {
    pub length: u16,
    pub capacity: u16,
    pub offset: u32,
}


/// Returns the `length` bytes at `offset`, or fails if any of them lie outside `buf`.
pub fn read_at(buf: &[u8], offset: usize, length: usize) -> Result<&[u8], NtlmParsingError> {
    let out_of_range = || NtlmParsingError::OutOfRange{ offset, length, buffer_len: buf.len() };
    let end = offset.checked_add(length)
        .ok_or_else(out_of_range)?;
    buf.get(offset..end)
        .ok_or_else(out_of_range)
}

fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, NtlmParsingError> {
    let bytes = read_at(buf, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32, NtlmParsingError> {
    let bytes = read_at(buf, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn utf16_le_bytes_to_string(bytes: &[u8]) -> Result<String, NtlmParsingError> {
    if bytes.len() % 2 != 0 {
        return Err(NtlmParsingError::ItemLengthNotDivisible{ expected_divisor: 2, obtained_length: bytes.len() });
    }
    let u16s: Vec<u16> = bytes.chunks_exact(2)
        .map(|chk| u16::from_le_bytes([chk[0], chk[1]]))
        .collect();
    String::from_utf16(&u16s)
        .or(Err(NtlmParsingError::InvalidUtf16{ value: u16s }))
}

fn oem_bytes_to_string(bytes: &[u8]) -> String {
    // OEM text is taken as Latin-1; every byte maps onto one code point
    bytes.iter()
        .map(|b| char::from(*b))
        .collect()
}

fn ntlm_bytes_to_string(flags: NtlmFlags, bytes: &[u8]) -> Result<String, NtlmParsingError> {
    if flags.contains(NtlmFlags::NEGOTIATE_UNICODE) {
        utf16_le_bytes_to_string(bytes)
    } else {
        Ok(oem_bytes_to_string(bytes))
    }
}

fn string_to_ntlm_bytes(flags: NtlmFlags, string: &str) -> Result<Vec<u8>, NtlmStoringError> {
    if flags.contains(NtlmFlags::NEGOTIATE_UNICODE) {
        Ok(string.encode_utf16()
            .flat_map(|w| w.to_le_bytes())
            .collect())
    } else {
        string.chars()
            .map(|c| u8::try_from(u32::from(c)))
            .collect::<Result<Vec<u8>, _>>()
            .or(Err(NtlmStoringError::NonOemEncodable{ string: string.to_owned() }))
    }
}

fn append_sec_buffer(packet_bytes: &mut Vec<u8>, data_block: &mut Vec<u8>, sec_buffer_offset: &mut u32, data: &[u8]) -> Result<(), NtlmStoringError> {
    // data_block will be placed at the end of the packet; fill it with the actual data
    data_block.extend_from_slice(data);

    let sb = NtlmSecurityBuffer::for_slice(data, *sec_buffer_offset)?;
    packet_bytes.extend_from_slice(&sb.to_bytes());

    *sec_buffer_offset += u32::from(sb.length);
    Ok(())
}

fn expect_message_type(bytes: &[u8], expected: NtlmMessageType) -> Result<(), NtlmParsingError> {
    let header = decode_header(bytes)?;
    if header.message_type != expected {
        return Err(NtlmParsingError::UnexpectedMessageType{ expected, obtained: header.message_type });
    }
    Ok(())
}


/// Checks the signature and extracts the message type.
pub fn decode_header(bytes: &[u8]) -> Result<NtlmHeader, NtlmParsingError> {
    if bytes.len() < MESSAGE_HEADER_LEN {
        return Err(NtlmParsingError::ShortHeader{ expected_min_len: MESSAGE_HEADER_LEN, obtained_len: bytes.len() });
    }
    let mut signature = [0u8; 8];
    signature.copy_from_slice(&bytes[0..8]);
    if signature != NTLMSSP_SIGNATURE {
        return Err(NtlmParsingError::SignatureMismatch{ obtained: Vec::from(signature) });
    }
    let message_type = NtlmMessageType::from(read_u32_le(bytes, 8)?);
    Ok(NtlmHeader {
        signature,
        message_type,
    })
}

/// Decodes a negotiate message.
///
/// Messages that end right after the header carry no flags and are accepted as
/// such; the domain and workstation are only read when their flags announce them.
pub fn decode_negotiate(bytes: &[u8]) -> Result<NtlmNegotiateMessage, NtlmParsingError> {
    expect_message_type(bytes, NtlmMessageType::Negotiate)?;

    if bytes.len() < NEGOTIATE_FLAGS_END {
        return Ok(NtlmNegotiateMessage {
            flags: NtlmFlags::empty(),
            supplied_domain: String::new(),
            supplied_workstation: String::new(),
        });
    }
    let flags = NtlmFlags::deserialize(read_u32_le(bytes, MESSAGE_HEADER_LEN)?);

    let mut supplied_domain = String::new();
    let mut supplied_workstation = String::new();
    if bytes.len() >= NEGOTIATE_FIXED_LEN {
        // negotiate strings are always OEM, whatever the flags say
        if flags.contains(NtlmFlags::NEGOTIATE_OEM_DOMAIN_SUPPLIED) {
            let secbuf = NtlmSecurityBuffer::read_from(bytes, 16)?;
            supplied_domain = oem_bytes_to_string(secbuf.apply_to_slice(bytes)?);
        }
        if flags.contains(NtlmFlags::NEGOTIATE_OEM_WORKSTATION_SUPPLIED) {
            let secbuf = NtlmSecurityBuffer::read_from(bytes, 24)?;
            supplied_workstation = oem_bytes_to_string(secbuf.apply_to_slice(bytes)?);
        }
    }

    Ok(NtlmNegotiateMessage {
        flags,
        supplied_domain,
        supplied_workstation,
    })
}

/// Encodes a challenge message with the target name placed right after the fixed fields.
pub fn encode_challenge(target_name: &[u8], server_challenge: [u8; 8], flags: NtlmFlags) -> Result<Vec<u8>, NtlmStoringError> {
    NtlmChallengeMessage {
        target_name: Vec::from(target_name),
        flags,
        server_challenge,
    }.to_bytes()
}

pub fn decode_challenge(bytes: &[u8]) -> Result<NtlmChallengeMessage, NtlmParsingError> {
    expect_message_type(bytes, NtlmMessageType::Challenge)?;
    if bytes.len() < CHALLENGE_FIXED_LEN {
        return Err(NtlmParsingError::ShortHeader{ expected_min_len: CHALLENGE_FIXED_LEN, obtained_len: bytes.len() });
    }

    let target_name_secbuf = NtlmSecurityBuffer::read_from(bytes, 12)?;
    let flags = NtlmFlags::deserialize(read_u32_le(bytes, 20)?);
    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(read_at(bytes, 24, 8)?);
    let target_name = Vec::from(target_name_secbuf.apply_to_slice(bytes)?);

    Ok(NtlmChallengeMessage {
        target_name,
        flags,
        server_challenge,
    })
}

/// Decodes an authenticate message.
///
/// Every variable field is fetched from its declared offset; the fields may
/// appear in any order after the fixed part.
pub fn decode_authenticate(bytes: &[u8]) -> Result<NtlmAuthenticateMessage, NtlmParsingError> {
    expect_message_type(bytes, NtlmMessageType::Authenticate)?;
    if bytes.len() < AUTHENTICATE_FIXED_LEN {
        return Err(NtlmParsingError::ShortHeader{ expected_min_len: AUTHENTICATE_FIXED_LEN, obtained_len: bytes.len() });
    }

    let lm_response_secbuf = NtlmSecurityBuffer::read_from(bytes, 12)?;
    let nt_response_secbuf = NtlmSecurityBuffer::read_from(bytes, 20)?;
    let domain_name_secbuf = NtlmSecurityBuffer::read_from(bytes, 28)?;
    let user_name_secbuf = NtlmSecurityBuffer::read_from(bytes, 36)?;
    let workstation_name_secbuf = NtlmSecurityBuffer::read_from(bytes, 44)?;
    let session_key_secbuf = NtlmSecurityBuffer::read_from(bytes, 52)?;
    let flags = NtlmFlags::deserialize(read_u32_le(bytes, 60)?);

    let lm_response = Vec::from(lm_response_secbuf.apply_to_slice(bytes)?);
    let nt_response = Vec::from(nt_response_secbuf.apply_to_slice(bytes)?);
    let domain_name = ntlm_bytes_to_string(flags, domain_name_secbuf.apply_to_slice(bytes)?)?;
    let user_name = ntlm_bytes_to_string(flags, user_name_secbuf.apply_to_slice(bytes)?)?;
    let workstation_name = ntlm_bytes_to_string(flags, workstation_name_secbuf.apply_to_slice(bytes)?)?;
    let session_key = Vec::from(session_key_secbuf.apply_to_slice(bytes)?);

    Ok(NtlmAuthenticateMessage {
        lm_response,
        nt_response,
        domain_name,
        user_name,
        workstation_name,
        session_key,
        flags,
    })
}


impl NtlmNegotiateMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, NtlmStoringError> {
        let mut sec_buffer_offset = NEGOTIATE_FIXED_LEN as u32;

        let mut ret = Vec::new();
        let mut data_block = Vec::new();

        ret.extend_from_slice(&NTLMSSP_SIGNATURE);
        ret.extend_from_slice(&u32::from(NtlmMessageType::Negotiate).to_le_bytes());
        ret.extend_from_slice(&self.flags.serialize().to_le_bytes());
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &string_to_ntlm_bytes(NtlmFlags::empty(), &self.supplied_domain)?)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &string_to_ntlm_bytes(NtlmFlags::empty(), &self.supplied_workstation)?)?;
        ret.append(&mut data_block);
        Ok(ret)
    }
}

impl NtlmChallengeMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, NtlmStoringError> {
        let target_name_secbuf = NtlmSecurityBuffer::for_slice(&self.target_name, CHALLENGE_FIXED_LEN as u32)?;

        let mut ret = Vec::with_capacity(CHALLENGE_FIXED_LEN + self.target_name.len());
        ret.extend_from_slice(&NTLMSSP_SIGNATURE);
        ret.extend_from_slice(&u32::from(NtlmMessageType::Challenge).to_le_bytes());
        ret.extend_from_slice(&target_name_secbuf.to_bytes());
        ret.extend_from_slice(&self.flags.serialize().to_le_bytes());
        ret.extend_from_slice(&self.server_challenge);
        ret.extend_from_slice(&[0u8; 8]); // reserved
        ret.extend_from_slice(&[0u8; 8]); // target info fields
        ret.extend_from_slice(&self.target_name);
        Ok(ret)
    }
}

impl NtlmAuthenticateMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, NtlmStoringError> {
        let mut sec_buffer_offset = AUTHENTICATE_FIXED_LEN as u32;

        let mut ret = Vec::new();
        let mut data_block = Vec::new();

        ret.extend_from_slice(&NTLMSSP_SIGNATURE);
        ret.extend_from_slice(&u32::from(NtlmMessageType::Authenticate).to_le_bytes());
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &self.lm_response)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &self.nt_response)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &string_to_ntlm_bytes(self.flags, &self.domain_name)?)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &string_to_ntlm_bytes(self.flags, &self.user_name)?)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &string_to_ntlm_bytes(self.flags, &self.workstation_name)?)?;
        append_sec_buffer(&mut ret, &mut data_block, &mut sec_buffer_offset, &self.session_key)?;
        ret.extend_from_slice(&self.flags.serialize().to_le_bytes());
        ret.append(&mut data_block);
        Ok(ret)
    }
}

impl NtlmSecurityBuffer {
    pub fn for_slice(slice: &[u8], offset: u32) -> Result<Self, NtlmStoringError> {
        let length: u16 = slice.len()
            .try_into()
            .or(Err(NtlmStoringError::BufferTooLong{ length: slice.len() }))?;
        Ok(Self {
            length,
            capacity: length,
            offset,
        })
    }

    /// Reads the descriptor stored at `at` within `message`.
    pub fn read_from(message: &[u8], at: usize) -> Result<Self, NtlmParsingError> {
        let length = read_u16_le(message, at)?;
        let capacity = read_u16_le(message, at + 2)?;
        let offset = read_u32_le(message, at + 4)?;
        Ok(Self {
            length,
            capacity,
            offset,
        })
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let mut ret = [0u8; 8];
        ret[0..2].copy_from_slice(&self.length.to_le_bytes());
        ret[2..4].copy_from_slice(&self.capacity.to_le_bytes());
        ret[4..8].copy_from_slice(&self.offset.to_le_bytes());
        ret
    }

    /// Offsets count from the start of the whole message, signature included.
    pub fn apply_to_slice<'a>(&self, message: &'a [u8]) -> Result<&'a [u8], NtlmParsingError> {
        let offset = usize::try_from(self.offset)
            .or(Err(NtlmParsingError::OutOfRange{ offset: usize::MAX, length: self.length.into(), buffer_len: message.len() }))?;
        read_at(message, offset, self.length.into())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn put_secbuf(message: &mut [u8], at: usize, length: u16, offset: u32) {
        message[at..at+2].copy_from_slice(&length.to_le_bytes());
        message[at+2..at+4].copy_from_slice(&length.to_le_bytes());
        message[at+4..at+8].copy_from_slice(&offset.to_le_bytes());
    }

    fn authenticate_skeleton(flags: NtlmFlags) -> Vec<u8> {
        let mut message = vec![0u8; AUTHENTICATE_FIXED_LEN];
        message[0..8].copy_from_slice(&NTLMSSP_SIGNATURE);
        message[8..12].copy_from_slice(&3u32.to_le_bytes());
        message[60..64].copy_from_slice(&flags.serialize().to_le_bytes());
        message
    }

    #[test]
    fn challenge_layout() {
        let flags = NtlmFlags::REQUEST_TARGET | NtlmFlags::NEGOTIATE_NTLM | NtlmFlags::NEGOTIATE_ALWAYS_SIGN;
        let challenge = [0x5C, 0xE3, 0x6B, 0xAA, 0x9C, 0x55, 0x51, 0xDB];
        let bytes = encode_challenge(b"EXAMPLE", challenge, flags).unwrap();

        assert_eq!(bytes.len(), 48 + 7);
        assert_eq!(&bytes[0..8], b"NTLMSSP\0");
        assert_eq!(&bytes[8..12], &[2, 0, 0, 0]);
        assert_eq!(&bytes[12..14], &[7, 0]); // length
        assert_eq!(&bytes[14..16], &[7, 0]); // max length
        assert_eq!(&bytes[16..20], &[48, 0, 0, 0]); // offset
        assert_eq!(&bytes[20..24], &[0x04, 0x82, 0x00, 0x00]);
        assert_eq!(&bytes[24..32], &challenge);
        assert_eq!(&bytes[32..48], &[0u8; 16]);
        assert_eq!(&bytes[48..], b"EXAMPLE");

        let decoded = decode_challenge(&bytes).unwrap();
        assert_eq!(decoded.target_name, b"EXAMPLE");
        assert_eq!(decoded.flags, flags);
        assert_eq!(decoded.server_challenge, challenge);
    }

    #[test]
    fn header_rejects_short_and_foreign_messages() {
        assert_eq!(
            decode_header(b"NTLMSSP\0\x01"),
            Err(NtlmParsingError::ShortHeader{ expected_min_len: 12, obtained_len: 9 }),
        );
        assert!(matches!(
            decode_header(b"NTLMSSX\0\x01\0\0\0"),
            Err(NtlmParsingError::SignatureMismatch{ .. }),
        ));

        let header = decode_header(b"NTLMSSP\0\x01\0\0\0").unwrap();
        assert_eq!(header.signature, NTLMSSP_SIGNATURE);
        assert_eq!(header.message_type, NtlmMessageType::Negotiate);

        let header = decode_header(b"NTLMSSP\0\x07\0\0\0").unwrap();
        assert_eq!(header.message_type, NtlmMessageType::Other(7));
    }

    #[test]
    fn authenticate_fields_are_located_by_offset() {
        // OEM strings, stored in reverse order of their descriptors
        let mut message = authenticate_skeleton(NtlmFlags::NEGOTIATE_NTLM);
        let user = b"test.user";
        let domain = b"EXAMPLE";
        let nt = [0x22u8; 24];
        let lm = [0x11u8; 24];

        let user_offset = message.len() as u32;
        message.extend_from_slice(user);
        let domain_offset = message.len() as u32;
        message.extend_from_slice(domain);
        let nt_offset = message.len() as u32;
        message.extend_from_slice(&nt);
        let lm_offset = message.len() as u32;
        message.extend_from_slice(&lm);

        put_secbuf(&mut message, 12, 24, lm_offset);
        put_secbuf(&mut message, 20, 24, nt_offset);
        put_secbuf(&mut message, 28, domain.len() as u16, domain_offset);
        put_secbuf(&mut message, 36, user.len() as u16, user_offset);

        let decoded = decode_authenticate(&message).unwrap();
        assert_eq!(decoded.lm_response, lm);
        assert_eq!(decoded.nt_response, nt);
        assert_eq!(decoded.domain_name, "EXAMPLE");
        assert_eq!(decoded.user_name, "test.user");
        assert_eq!(decoded.workstation_name, "");
        assert!(decoded.session_key.is_empty());
        assert_eq!(decoded.flags, NtlmFlags::NEGOTIATE_NTLM);
    }

    #[test]
    fn authenticate_decodes_unicode_names() {
        let message = NtlmAuthenticateMessage {
            lm_response: vec![1; 24],
            nt_response: vec![2; 24],
            domain_name: "EXAMPLE".to_owned(),
            user_name: "j\u{f6}rg".to_owned(),
            workstation_name: "WS01".to_owned(),
            session_key: Vec::new(),
            flags: NtlmFlags::NEGOTIATE_UNICODE | NtlmFlags::NEGOTIATE_NTLM,
        };
        let bytes = message.to_bytes().unwrap();

        // "EXAMPLE" as UTF-16LE follows both responses
        assert_eq!(&bytes[28..30], &[14, 0]);
        assert_eq!(&bytes[32..36], &(64u32 + 48).to_le_bytes());

        assert_eq!(decode_authenticate(&bytes).unwrap(), message);
    }

    #[test]
    fn authenticate_rejects_out_of_bounds_fields() {
        let mut message = authenticate_skeleton(NtlmFlags::NEGOTIATE_NTLM);
        message.extend_from_slice(&[0xAA; 24]);
        put_secbuf(&mut message, 12, 24, 64);
        // NT response claims 24 bytes but only 16 remain after offset 72
        put_secbuf(&mut message, 20, 24, 72);

        assert_eq!(
            decode_authenticate(&message),
            Err(NtlmParsingError::OutOfRange{ offset: 72, length: 24, buffer_len: 88 }),
        );

        let mut message = authenticate_skeleton(NtlmFlags::NEGOTIATE_NTLM);
        put_secbuf(&mut message, 36, 4, u32::MAX);
        assert!(matches!(decode_authenticate(&message), Err(NtlmParsingError::OutOfRange{ .. })));
    }

    #[test]
    fn authenticate_rejects_truncated_header() {
        let message = authenticate_skeleton(NtlmFlags::empty());
        assert_eq!(
            decode_authenticate(&message[..40]),
            Err(NtlmParsingError::ShortHeader{ expected_min_len: 64, obtained_len: 40 }),
        );
    }

    #[test]
    fn authenticate_rejects_odd_unicode_lengths() {
        let mut message = authenticate_skeleton(NtlmFlags::NEGOTIATE_UNICODE);
        message.extend_from_slice(b"abc");
        put_secbuf(&mut message, 36, 3, 64);
        assert_eq!(
            decode_authenticate(&message),
            Err(NtlmParsingError::ItemLengthNotDivisible{ expected_divisor: 2, obtained_length: 3 }),
        );
    }

    #[test]
    fn authenticate_decoder_refuses_other_types() {
        let negotiate = NtlmNegotiateMessage {
            flags: NtlmFlags::NEGOTIATE_NTLM,
            supplied_domain: String::new(),
            supplied_workstation: String::new(),
        }.to_bytes().unwrap();
        assert_eq!(
            decode_authenticate(&negotiate),
            Err(NtlmParsingError::UnexpectedMessageType{
                expected: NtlmMessageType::Authenticate,
                obtained: NtlmMessageType::Negotiate,
            }),
        );
    }

    #[test]
    fn negotiate_reads_supplied_names() {
        let message = NtlmNegotiateMessage {
            flags: NtlmFlags::NEGOTIATE_NTLM
                | NtlmFlags::NEGOTIATE_OEM_DOMAIN_SUPPLIED
                | NtlmFlags::NEGOTIATE_OEM_WORKSTATION_SUPPLIED,
            supplied_domain: "EXAMPLE".to_owned(),
            supplied_workstation: "WS01".to_owned(),
        };
        let bytes = message.to_bytes().unwrap();
        assert_eq!(decode_negotiate(&bytes).unwrap(), message);

        // a bare header is still a negotiate message
        let bare = decode_negotiate(b"NTLMSSP\0\x01\0\0\0").unwrap();
        assert_eq!(bare.flags, NtlmFlags::empty());
    }
}

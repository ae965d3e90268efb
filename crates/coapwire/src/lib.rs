//! # Coapwire
//!
//! A distinctively small, strict codec for the CoAP message layer (RFC 7252 §3).
//!
//! ## Philosophy
//!
//! - **Header Only**: Coapwire knows packet types, codes, ids, tokens, options and
//!   payloads. It knows nothing about resources, block transfers or observation.
//! - **Strict**: Decoding rejects anything the RFC calls a message format error.
//!   Nothing is guessed, nothing panics on hostile input.
//! - **Owned**: A parsed `Message` owns its bytes, so it can cross task boundaries.
//!
//! ## Format
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```
//!
//! All multi-byte integers are Big-Endian.


/// The only protocol version defined by RFC 7252.
pub const VERSION: u8 = 1;

/// Separates options from a non-empty payload.
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// Longest token permitted on the wire.
pub const MAX_TOKEN_LEN: usize = 8;

/// Coapwire serialization and deserialization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// The version bits are not `1`.
    InvalidVersion(u8),
    /// Token length nibble is 9..=15, which the RFC reserves.
    InvalidTokenLength(u8),
    /// A code in class 0 that is not one of GET/POST/PUT/DELETE.
    UnknownMethod(u8),
    /// A code in a reserved class (1, 6 or 7).
    ReservedCode(u8),
    /// Option delta or length nibble of 15 outside the payload marker.
    ReservedOptionNibble,
    /// Option number overflowed `u16` while applying deltas.
    OptionOverflow,
    /// The payload marker was present but nothing followed it.
    EmptyPayload,
    /// An empty message (code 0.00) carried a token, options or payload.
    MalformedEmpty,
    /// Token longer than `MAX_TOKEN_LEN` on an outbound message.
    TokenTooLong(usize),
    /// Option value longer than the extended length encoding allows.
    OptionTooLarge(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidVersion(v) => write!(f, "Invalid CoAP version: {}", v),
            Error::InvalidTokenLength(l) => write!(f, "Invalid token length: {}", l),
            Error::UnknownMethod(c) => write!(f, "Unknown request method: {}", CodeDisplay(*c)),
            Error::ReservedCode(c) => write!(f, "Reserved code class: {}", CodeDisplay(*c)),
            Error::TokenTooLong(l) => write!(f, "Token too long: {} bytes (max {})", l, MAX_TOKEN_LEN),
            Error::OptionTooLarge(l) => write!(f, "Option value too large: {} bytes", l),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Coapwire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Renders a raw code byte as `c.dd`.
struct CodeDisplay(u8);

impl std::fmt::Display for CodeDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 >> 5, self.0 & 0x1F)
    }
}

// ============================================================================
//  PACKET TYPES & CODES
// ============================================================================

/// The message type carried in bits 2-3 of the first header byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Confirmable: the receiver must acknowledge.
    Con = 0,
    /// Non-confirmable.
    Non = 1,
    /// Acknowledgement of a confirmable message.
    Ack = 2,
    /// Reset.
    Rst = 3,
}

impl PacketType {
    /// Decodes the two type bits. Every value is valid.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => PacketType::Con,
            1 => PacketType::Non,
            2 => PacketType::Ack,
            _ => PacketType::Rst,
        }
    }
}

/// Request methods (class 0).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get = 0x01,
    Post = 0x02,
    Put = 0x03,
    Delete = 0x04,
}

impl Method {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Method::Get),
            0x02 => Some(Method::Post),
            0x03 => Some(Method::Put),
            0x04 => Some(Method::Delete),
            _ => None,
        }
    }
}

/// Response codes (classes 2, 4 and 5).
///
/// Codes from the RFC 7252 registry get their own variant. Any other code in a
/// response class is kept as `Other`, so its class still decides success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    PreconditionFailed,
    RequestEntityTooLarge,
    UnsupportedContentFormat,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ProxyingNotSupported,
    /// A response-class code outside the registry, e.g. 4.29.
    /// `from_u8` never yields this for a registered code.
    Other(u8),
}

impl ResponseCode {
    /// Returns `None` unless `b` is in class 2, 4 or 5.
    pub fn from_u8(b: u8) -> Option<Self> {
        use ResponseCode::*;
        if !matches!(b >> 5, 2 | 4 | 5) {
            return None;
        }
        let code = match b {
            0x41 => Created,
            0x42 => Deleted,
            0x43 => Valid,
            0x44 => Changed,
            0x45 => Content,
            0x80 => BadRequest,
            0x81 => Unauthorized,
            0x82 => BadOption,
            0x83 => Forbidden,
            0x84 => NotFound,
            0x85 => MethodNotAllowed,
            0x86 => NotAcceptable,
            0x8C => PreconditionFailed,
            0x8D => RequestEntityTooLarge,
            0x8F => UnsupportedContentFormat,
            0xA0 => InternalServerError,
            0xA1 => NotImplemented,
            0xA2 => BadGateway,
            0xA3 => ServiceUnavailable,
            0xA4 => GatewayTimeout,
            0xA5 => ProxyingNotSupported,
            other => Other(other),
        };
        Some(code)
    }

    pub fn as_u8(self) -> u8 {
        use ResponseCode::*;
        match self {
            Created => 0x41,
            Deleted => 0x42,
            Valid => 0x43,
            Changed => 0x44,
            Content => 0x45,
            BadRequest => 0x80,
            Unauthorized => 0x81,
            BadOption => 0x82,
            Forbidden => 0x83,
            NotFound => 0x84,
            MethodNotAllowed => 0x85,
            NotAcceptable => 0x86,
            PreconditionFailed => 0x8C,
            RequestEntityTooLarge => 0x8D,
            UnsupportedContentFormat => 0x8F,
            InternalServerError => 0xA0,
            NotImplemented => 0xA1,
            BadGateway => 0xA2,
            ServiceUnavailable => 0xA3,
            GatewayTimeout => 0xA4,
            ProxyingNotSupported => 0xA5,
            Other(b) => b,
        }
    }

    /// True for the 2.xx class.
    pub fn is_success(self) -> bool {
        self.as_u8() >> 5 == 2
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseCode::Other(b) => write!(f, "{}", CodeDisplay(*b)),
            known => write!(f, "{} {:?}", CodeDisplay(known.as_u8()), known),
        }
    }
}

/// The second header byte, interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// 0.00, only valid on empty messages.
    Empty,
    Request(Method),
    Response(ResponseCode),
}

impl Code {
    pub fn from_u8(b: u8) -> Result<Self> {
        match b >> 5 {
            0 if b == 0 => Ok(Code::Empty),
            0 => Method::from_u8(b).map(Code::Request).ok_or(Error::UnknownMethod(b)),
            2 | 4 | 5 => ResponseCode::from_u8(b).map(Code::Response).ok_or(Error::ReservedCode(b)),
            _ => Err(Error::ReservedCode(b)),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Code::Empty => 0,
            Code::Request(m) => m as u8,
            Code::Response(r) => r.as_u8(),
        }
    }
}

// ============================================================================
//  MESSAGE
// ============================================================================

/// A single option instance. Numbers are absolute, not deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

/// A complete CoAP message.
///
/// Options are kept sorted by number; `serialize` relies on it to compute deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub packet_type: PacketType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a request with no token, options or payload.
    pub fn request(packet_type: PacketType, method: Method, message_id: u16) -> Self {
        Self::with_code(packet_type, Code::Request(method), message_id)
    }

    /// Creates a response with no token, options or payload.
    pub fn response(packet_type: PacketType, code: ResponseCode, message_id: u16) -> Self {
        Self::with_code(packet_type, Code::Response(code), message_id)
    }

    /// Creates an empty message (e.g. a standalone ACK or a RST).
    pub fn empty(packet_type: PacketType, message_id: u16) -> Self {
        Self::with_code(packet_type, Code::Empty, message_id)
    }

    fn with_code(packet_type: PacketType, code: Code, message_id: u16) -> Self {
        Self {
            packet_type,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.token = token.into();
        self
    }

    /// Adds an option, keeping the list ordered by number.
    /// Repeated numbers keep their insertion order.
    pub fn add_option(&mut self, number: u16, value: impl Into<Vec<u8>>) {
        let idx = self.options.partition_point(|o| o.number <= number);
        self.options.insert(idx, CoapOption { number, value: value.into() });
    }

    pub fn options(&self) -> &[CoapOption] {
        &self.options
    }

    pub fn method(&self) -> Option<Method> {
        match self.code {
            Code::Request(m) => Some(m),
            _ => None,
        }
    }

    pub fn response_code(&self) -> Option<ResponseCode> {
        match self.code {
            Code::Response(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.code, Code::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self.code, Code::Response(_))
    }

    pub fn is_confirmable(&self) -> bool {
        self.packet_type == PacketType::Con
    }

    /// Decodes a full datagram.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);

        let first = dec.read_u8()?;
        let version = first >> 6;
        if version != VERSION {
            return Err(Error::InvalidVersion(version));
        }
        let packet_type = PacketType::from_bits(first >> 4);
        let tkl = first & 0x0F;
        if tkl as usize > MAX_TOKEN_LEN {
            return Err(Error::InvalidTokenLength(tkl));
        }

        let code_byte = dec.read_u8()?;
        let message_id = dec.read_u16()?;

        if code_byte == 0 {
            // RFC 7252 §4.1: an empty message is exactly the 4-byte header.
            if tkl != 0 || dec.remaining() != 0 {
                return Err(Error::MalformedEmpty);
            }
            return Ok(Self::empty(packet_type, message_id));
        }

        let code = Code::from_u8(code_byte)?;
        let token = dec.read_bytes(tkl as usize)?.to_vec();

        let mut options = Vec::new();
        let mut number: u16 = 0;
        let mut payload = Vec::new();

        while dec.remaining() > 0 {
            let head = dec.read_u8()?;
            if head == PAYLOAD_MARKER {
                if dec.remaining() == 0 {
                    return Err(Error::EmptyPayload);
                }
                payload = dec.rest().to_vec();
                break;
            }

            let delta = dec.read_extended(head >> 4)?;
            let len = dec.read_extended(head & 0x0F)?;
            number = u16::try_from(number as u32 + delta).map_err(|_| Error::OptionOverflow)?;
            let value = dec.read_bytes(len as usize)?.to_vec();
            options.push(CoapOption { number, value });
        }

        Ok(Self { packet_type, code, message_id, token, options, payload })
    }

    /// Encodes the message into a fresh buffer.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(Error::TokenTooLong(self.token.len()));
        }
        if self.code == Code::Empty
            && (!self.token.is_empty() || !self.options.is_empty() || !self.payload.is_empty())
        {
            return Err(Error::MalformedEmpty);
        }

        let mut buf = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 1);
        buf.push((VERSION << 6) | ((self.packet_type as u8) << 4) | self.token.len() as u8);
        buf.push(self.code.as_u8());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.token);

        let mut last: u16 = 0;
        for opt in &self.options {
            let delta = (opt.number - last) as u32;
            let len = u32::try_from(opt.value.len())
                .ok()
                .filter(|l| *l <= u16::MAX as u32 + 269)
                .ok_or(Error::OptionTooLarge(opt.value.len()))?;

            let (delta_nibble, delta_ext) = split_extended(delta);
            let (len_nibble, len_ext) = split_extended(len);
            buf.push((delta_nibble << 4) | len_nibble);
            buf.extend_from_slice(&delta_ext);
            buf.extend_from_slice(&len_ext);
            buf.extend_from_slice(&opt.value);
            last = opt.number;
        }

        if !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }

        Ok(buf)
    }
}

/// Splits a delta or length into its nibble and extended bytes.
fn split_extended(v: u32) -> (u8, Vec<u8>) {
    match v {
        0..=12 => (v as u8, Vec::new()),
        13..=268 => (13, vec![(v - 13) as u8]),
        _ => (14, ((v - 269) as u16).to_be_bytes().to_vec()),
    }
}

// ============================================================================
//  DECODER
// ============================================================================

/// A bounds-checked cursor over a datagram.
///
/// # Errors
/// All read operations return `Error::UnexpectedEnd` if the buffer is exhausted.
#[derive(Debug, Clone)]
struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let (&b, tail) = self.buf.split_first().ok_or(Error::UnexpectedEnd)?;
        self.buf = tail;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() { return Err(Error::UnexpectedEnd); }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Resolves an option nibble, reading its extended bytes if any.
    fn read_extended(&mut self, nibble: u8) -> Result<u32> {
        match nibble {
            0..=12 => Ok(nibble as u32),
            13 => Ok(self.read_u8()? as u32 + 13),
            14 => Ok(self.read_u16()? as u32 + 269),
            _ => Err(Error::ReservedOptionNibble),
        }
    }
}

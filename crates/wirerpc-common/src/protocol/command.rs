//! Wire commands: the unit of transmission.
//!
//! A [`Command`] is a [`Header`] plus an opaque payload. The header's type
//! code fully determines how the payload is interpreted; the transport and
//! codec never look inside it.

/// Protocol version written into every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Header type code for request commands.
pub const TYPE_REQUEST: u8 = 0;
/// Header type code for response commands.
pub const TYPE_RESPONSE: u8 = 1;

/// Correlation identifier pairing a request with its response.
pub type RequestId = u64;

/// Response status carried in a response header.
///
/// Zero is success; any nonzero byte is an error status. Codes this peer
/// does not know about decode as [`Code::Other`] rather than failing, since
/// the wire contract only distinguishes zero from nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    /// The invoked method failed or the request payload was unusable.
    Failure,
    /// No service registered under the requested interface name.
    NoService,
    /// The service has no method under the requested name.
    NoMethod,
    /// Arguments could not be decoded into the method's expected shape.
    BadArguments,
    /// Any other nonzero status byte.
    Other(u8),
}

impl Code {
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0 => Code::Success,
            1 => Code::Failure,
            2 => Code::NoService,
            3 => Code::NoMethod,
            4 => Code::BadArguments,
            other => Code::Other(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Code::Success => 0,
            Code::Failure => 1,
            Code::NoService => 2,
            Code::NoMethod => 3,
            Code::BadArguments => 4,
            Code::Other(byte) => byte,
        }
    }

    pub fn is_success(self) -> bool {
        self == Code::Success
    }
}

/// Header of a request command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub version: u8,
    pub request_id: RequestId,
}

/// Header of a response command.
///
/// Carries the status code and, on failure, the server's error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub request_id: RequestId,
    pub code: Code,
    pub error: Option<String>,
}

/// Command header, polymorphic over the two wire variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Request(RequestHeader),
    Response(ResponseHeader),
}

impl Header {
    pub fn request_id(&self) -> RequestId {
        match self {
            Header::Request(h) => h.request_id,
            Header::Response(h) => h.request_id,
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            Header::Request(h) => h.version,
            Header::Response(h) => h.version,
        }
    }
}

/// A single wire transmission: header plus opaque payload.
///
/// Ephemeral; one per call attempt (request or response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Command {
    /// Creates a request command with the current protocol version.
    ///
    /// # Example
    ///
    /// ```
    /// use wirerpc_common::protocol::{Command, Header};
    ///
    /// let command = Command::request(42, vec![1, 2, 3]);
    /// assert_eq!(command.request_id(), 42);
    /// assert!(matches!(command.header, Header::Request(_)));
    /// ```
    pub fn request(request_id: RequestId, payload: Vec<u8>) -> Self {
        Command {
            header: Header::Request(RequestHeader {
                version: PROTOCOL_VERSION,
                request_id,
            }),
            payload,
        }
    }

    /// Creates a successful response carrying `payload` as the result.
    pub fn success(request_id: RequestId, payload: Vec<u8>) -> Self {
        Command {
            header: Header::Response(ResponseHeader {
                version: PROTOCOL_VERSION,
                request_id,
                code: Code::Success,
                error: None,
            }),
            payload,
        }
    }

    /// Creates an error response with the given status and message.
    pub fn error(request_id: RequestId, code: Code, message: impl Into<String>) -> Self {
        Command {
            header: Header::Response(ResponseHeader {
                version: PROTOCOL_VERSION,
                request_id,
                code,
                error: Some(message.into()),
            }),
            payload: Vec::new(),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.header.request_id()
    }
}

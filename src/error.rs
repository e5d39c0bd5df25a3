//! Unified error types for rtmpcast

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all RTMP operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during network operations
    Io(io::Error),
    /// RTMP protocol violation
    Protocol(ProtocolError),
    /// AMF encoding/decoding error
    Amf(AmfError),
    /// Handshake failure
    Handshake(HandshakeError),
    /// Media parsing error
    Media(MediaError),
    /// Command rejected by the peer (connect failed, createStream without a
    /// stream id, ...)
    Rejected(String),
    /// Operation called out of order (e.g. write_packet before write_header)
    InvalidState(&'static str),
    /// Operation timed out
    Timeout,
    /// Connection was closed
    ConnectionClosed,
    /// Invalid RTMP URL
    Url(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::Rejected(msg) => write!(f, "Rejected by peer: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Url(msg) => write!(f, "Invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl From<MediaError> for Error {
    fn from(err: MediaError) -> Self {
        Error::Media(err)
    }
}

/// Protocol-level errors
#[derive(Debug)]
pub enum ProtocolError {
    /// Malformed or truncated chunk/message header
    InvalidChunkHeader,
    /// Type-0/1/2 header arrived while a message on the same chunk stream
    /// was still being reassembled
    ChunkBoundary { csid: u32, remaining: u32 },
    /// Declared message length exceeds the sanity limit
    MessageTooLarge { size: u32, max: u32 },
    /// Command message with an unusable shape
    InvalidCommand(String),
    /// Required field missing from a command object
    MissingField(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidChunkHeader => write!(f, "Invalid chunk header"),
            ProtocolError::ChunkBoundary { csid, remaining } => {
                write!(
                    f,
                    "New message header on csid {} with {} bytes still pending",
                    csid, remaining
                )
            }
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::InvalidCommand(cmd) => write!(f, "Invalid command: {}", cmd),
            ProtocolError::MissingField(field) => write!(f, "Missing required field: {}", field),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF encoding/decoding errors
#[derive(Debug)]
pub enum AmfError {
    UnknownMarker(u8),
    UnexpectedEof,
    InvalidUtf8,
    InvalidReference(u16),
    NestingTooDeep,
    InvalidObjectEnd,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnknownMarker(m) => write!(f, "Unknown AMF marker: 0x{:02x}", m),
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::InvalidReference(idx) => write!(f, "Invalid AMF reference: {}", idx),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::InvalidObjectEnd => write!(f, "Invalid object end marker"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake-specific errors
#[derive(Debug)]
pub enum HandshakeError {
    InvalidVersion(u8),
    DigestMismatch,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "Invalid RTMP version: {}", v),
            HandshakeError::DigestMismatch => write!(f, "Handshake digest mismatch"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Media parsing errors
#[derive(Debug)]
pub enum MediaError {
    InvalidAvcConfig,
    InvalidSps,
    InvalidAacConfig,
    /// Codec outside the supported set (H.264 video, AAC audio)
    UnsupportedCodec(&'static str),
    /// Probe window exhausted without deriving any codec description
    ProbeWindowExhausted,
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidAvcConfig => write!(f, "Invalid AVC decoder configuration"),
            MediaError::InvalidSps => write!(f, "Invalid H.264 sequence parameter set"),
            MediaError::InvalidAacConfig => write!(f, "Invalid AAC audio specific config"),
            MediaError::UnsupportedCodec(c) => write!(f, "Unsupported codec: {}", c),
            MediaError::ProbeWindowExhausted => {
                write!(f, "No codec description found within the probe window")
            }
        }
    }
}

impl std::error::Error for MediaError {}

//! RTMP message types and parsing
//!
//! RTMP messages are classified into:
//! - Protocol Control Messages (types 1, 5, 6): chunk/flow control
//! - User Control Messages (type 4): stream events
//! - Command Messages (types 17, 20): AMF-encoded commands
//! - Data Messages (types 15, 18): metadata
//! - Audio/Video Messages (types 8, 9): media data
//!
//! AMF3-flavored command/data messages (types 17/15) are handled by skipping
//! the leading marker byte and parsing the remainder as AMF0.
//!
//! Reference: RTMP Specification Section 5.4

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{Amf0Decoder, Amf0Encoder, AmfValue};
use crate::error::{AmfError, ProtocolError, Result};
use crate::protocol::chunk::RawMessage;
use crate::protocol::constants::*;

/// Parsed RTMP message
#[derive(Debug, Clone)]
pub enum RtmpMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit_type: u8 },

    /// Audio data (type 8)
    Audio { timestamp: u32, data: Bytes },

    /// Video data (type 9)
    Video { timestamp: u32, data: Bytes },

    /// AMF0/AMF3 Command (types 20/17)
    Command(Command),

    /// AMF0/AMF3 Data message (types 18/15) - metadata etc.
    Data(DataMessage),

    /// Any other message type, kept opaque
    Unknown { type_id: u8, data: Bytes },
}

/// User Control Event
#[derive(Debug, Clone)]
pub enum UserControlEvent {
    StreamBegin(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    Unknown { event_type: u16, data: Bytes },
}

/// RTMP command (connect, publish, play, _result, ...)
#[derive(Debug, Clone)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Transaction ID
    pub transaction_id: f64,
    /// Command object (often null for responses)
    pub command_object: AmfValue,
    /// Additional arguments
    pub arguments: Vec<AmfValue>,
    /// Message stream ID the command arrived on
    pub stream_id: u32,
}

/// Data message (onMetaData, |RtmpSampleAccess, ...)
#[derive(Debug, Clone)]
pub struct DataMessage {
    /// Values, including the leading handler-name string
    pub values: Vec<AmfValue>,
    /// Message stream ID
    pub stream_id: u32,
}

impl DataMessage {
    /// Handler name (first string value), if any
    pub fn name(&self) -> Option<&str> {
        self.values.first().and_then(|v| v.as_str())
    }
}

impl RtmpMessage {
    /// Parse a reassembled message
    pub fn from_raw(raw: &RawMessage) -> Result<Self> {
        let mut payload = raw.payload.clone();

        match raw.message_type {
            MSG_SET_CHUNK_SIZE => {
                if payload.len() < 4 {
                    return Err(ProtocolError::InvalidChunkHeader.into());
                }
                let size = payload.get_u32() & 0x7FFF_FFFF; // Ignore MSB
                Ok(RtmpMessage::SetChunkSize(size))
            }

            MSG_USER_CONTROL => Self::parse_user_control(&mut payload),

            MSG_WINDOW_ACK_SIZE => {
                if payload.len() < 4 {
                    return Err(ProtocolError::InvalidChunkHeader.into());
                }
                Ok(RtmpMessage::WindowAckSize(payload.get_u32()))
            }

            MSG_SET_PEER_BANDWIDTH => {
                if payload.len() < 5 {
                    return Err(ProtocolError::InvalidChunkHeader.into());
                }
                let size = payload.get_u32();
                let limit_type = payload.get_u8();
                Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
            }

            MSG_AUDIO => Ok(RtmpMessage::Audio {
                timestamp: raw.timestamp,
                data: payload,
            }),

            MSG_VIDEO => Ok(RtmpMessage::Video {
                timestamp: raw.timestamp,
                data: payload,
            }),

            MSG_COMMAND_AMF0 => {
                let cmd = Self::parse_command(&mut payload, raw.stream_id)?;
                Ok(RtmpMessage::Command(cmd))
            }

            MSG_COMMAND_AMF3 => {
                // Skip the AMF3 marker byte, parse the rest as AMF0
                if !payload.is_empty() {
                    payload.advance(1);
                }
                let cmd = Self::parse_command(&mut payload, raw.stream_id)?;
                Ok(RtmpMessage::Command(cmd))
            }

            MSG_DATA_AMF0 => {
                let data = Self::parse_data(&mut payload, raw.stream_id)?;
                Ok(RtmpMessage::Data(data))
            }

            MSG_DATA_AMF3 => {
                if !payload.is_empty() {
                    payload.advance(1);
                }
                let data = Self::parse_data(&mut payload, raw.stream_id)?;
                Ok(RtmpMessage::Data(data))
            }

            _ => Ok(RtmpMessage::Unknown {
                type_id: raw.message_type,
                data: payload,
            }),
        }
    }

    /// Parse User Control message
    fn parse_user_control(payload: &mut Bytes) -> Result<Self> {
        if payload.len() < 2 {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }

        let event_type = payload.get_u16();
        let event = match event_type {
            UC_STREAM_BEGIN if payload.len() >= 4 => {
                UserControlEvent::StreamBegin(payload.get_u32())
            }
            UC_SET_BUFFER_LENGTH if payload.len() >= 8 => {
                let stream_id = payload.get_u32();
                let buffer_ms = payload.get_u32();
                UserControlEvent::SetBufferLength {
                    stream_id,
                    buffer_ms,
                }
            }
            UC_STREAM_IS_RECORDED if payload.len() >= 4 => {
                UserControlEvent::StreamIsRecorded(payload.get_u32())
            }
            _ => UserControlEvent::Unknown {
                event_type,
                data: payload.clone(),
            },
        };

        Ok(RtmpMessage::UserControl(event))
    }

    /// Parse AMF0 command: name, transaction id, command object, arguments
    fn parse_command(payload: &mut Bytes, stream_id: u32) -> Result<Command> {
        let mut decoder = Amf0Decoder::new();

        let name = match decoder.decode(payload)? {
            AmfValue::String(s) => s,
            other => {
                return Err(
                    ProtocolError::InvalidCommand(format!("name is {:?}", other)).into(),
                )
            }
        };

        let transaction_id = match decoder.decode(payload) {
            Ok(AmfValue::Number(n)) => n,
            _ => 0.0, // Lenient: some encoders omit it
        };

        let command_object = if payload.has_remaining() {
            decoder.decode(payload)?
        } else {
            AmfValue::Null
        };

        let mut arguments = Vec::new();
        while payload.has_remaining() {
            match decoder.decode(payload) {
                Ok(v) => arguments.push(v),
                Err(AmfError::UnexpectedEof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Command {
            name,
            transaction_id,
            command_object,
            arguments,
            stream_id,
        })
    }

    /// Parse AMF0 data message into its value sequence
    fn parse_data(payload: &mut Bytes, stream_id: u32) -> Result<DataMessage> {
        let mut decoder = Amf0Decoder::new();

        let mut values = Vec::new();
        while payload.has_remaining() {
            match decoder.decode(payload) {
                Ok(v) => values.push(v),
                Err(AmfError::UnexpectedEof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(DataMessage { values, stream_id })
    }

    /// Encode message to (type id, payload)
    pub fn encode(&self) -> (u8, Bytes) {
        match self {
            RtmpMessage::SetChunkSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_SET_CHUNK_SIZE, buf.freeze())
            }

            RtmpMessage::WindowAckSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_WINDOW_ACK_SIZE, buf.freeze())
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                (MSG_SET_PEER_BANDWIDTH, buf.freeze())
            }

            RtmpMessage::UserControl(event) => {
                let mut buf = BytesMut::with_capacity(10);
                match event {
                    UserControlEvent::StreamBegin(id) => {
                        buf.put_u16(UC_STREAM_BEGIN);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::SetBufferLength {
                        stream_id,
                        buffer_ms,
                    } => {
                        buf.put_u16(UC_SET_BUFFER_LENGTH);
                        buf.put_u32(*stream_id);
                        buf.put_u32(*buffer_ms);
                    }
                    UserControlEvent::StreamIsRecorded(id) => {
                        buf.put_u16(UC_STREAM_IS_RECORDED);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::Unknown { event_type, data } => {
                        buf.put_u16(*event_type);
                        buf.put_slice(data);
                    }
                }
                (MSG_USER_CONTROL, buf.freeze())
            }

            RtmpMessage::Audio { data, .. } => (MSG_AUDIO, data.clone()),

            RtmpMessage::Video { data, .. } => (MSG_VIDEO, data.clone()),

            RtmpMessage::Command(cmd) => (MSG_COMMAND_AMF0, encode_command(cmd)),

            RtmpMessage::Data(data) => (MSG_DATA_AMF0, encode_data(data)),

            RtmpMessage::Unknown { type_id, data } => (*type_id, data.clone()),
        }
    }
}

/// Encode a command to AMF0 bytes
fn encode_command(cmd: &Command) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(&AmfValue::String(cmd.name.clone()));
    encoder.encode(&AmfValue::Number(cmd.transaction_id));
    encoder.encode(&cmd.command_object);
    for arg in &cmd.arguments {
        encoder.encode(arg);
    }
    encoder.finish()
}

/// Encode a data message to AMF0 bytes
fn encode_data(data: &DataMessage) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    for value in &data.values {
        encoder.encode(value);
    }
    encoder.finish()
}

impl Command {
    /// Create a _result response
    pub fn result(transaction_id: f64, properties: AmfValue, info: AmfValue) -> Self {
        Command {
            name: CMD_RESULT.to_string(),
            transaction_id,
            command_object: properties,
            arguments: vec![info],
            stream_id: 0,
        }
    }

    /// Create an onStatus response
    pub fn on_status(transaction_id: f64, level: &str, code: &str, description: &str) -> Self {
        let info = crate::amf_object! {
            "level" => level,
            "code" => code,
            "description" => description,
        };

        Command {
            name: CMD_ON_STATUS.to_string(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: vec![info],
            stream_id: 0,
        }
    }

    /// Code string of the first info-object argument, if any
    pub fn info_code(&self) -> Option<&str> {
        self.arguments.first()?.get_string("code")
    }
}

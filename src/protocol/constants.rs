//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)
//! Reference: RFC 7425 - Adobe's RTMP (Informational)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port
pub const RTMP_PORT: u16 = 1935;

/// Handshake packet sizes (C1/C2/S1/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size (per RTMP spec)
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size the server switches to after accepting a connect
pub const SERVER_CHUNK_SIZE: u32 = 128 * 1024 * 1024;

/// Maximum message size (sanity limit, also the largest 24-bit length)
pub const MAX_MESSAGE_SIZE: u32 = 0xFFFFFF;

/// Extended timestamp threshold
/// Timestamps >= this value require extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

// ============================================================================
// Chunk Stream IDs (CSID)
// RTMP spec section 5.3.1.1; A/V and command assignments follow FMS
// conventions.
// ============================================================================

/// Protocol control messages (Set Chunk Size, Window Ack Size, etc.)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// NetConnection commands (connect, createStream, _result)
pub const CSID_COMMAND: u32 = 3;

/// NetStream status commands and data messages (onStatus, onMetaData)
pub const CSID_AV_COMMAND: u32 = 5;

/// Audio data
pub const CSID_AUDIO: u32 = 6;

/// Video data
pub const CSID_VIDEO: u32 = 7;

/// NetStream requests from the client (publish, play)
pub const CSID_STREAM_COMMAND: u32 = 8;

// ============================================================================
// Message Type IDs
// RTMP spec section 5.4
// ============================================================================

/// Set Chunk Size (1) - protocol control
pub const MSG_SET_CHUNK_SIZE: u8 = 1;

/// User Control Message (4)
pub const MSG_USER_CONTROL: u8 = 4;

/// Window Acknowledgement Size (5) - protocol control
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;

/// Set Peer Bandwidth (6) - protocol control
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Audio Message (8)
pub const MSG_AUDIO: u8 = 8;

/// Video Message (9)
pub const MSG_VIDEO: u8 = 9;

/// AMF3 Data Message (15)
pub const MSG_DATA_AMF3: u8 = 15;

/// AMF3 Command Message (17)
pub const MSG_COMMAND_AMF3: u8 = 17;

/// AMF0 Data Message (18) - @setDataFrame, onMetaData
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Command Message (20) - connect, play, publish, etc.
pub const MSG_COMMAND_AMF0: u8 = 20;

// ============================================================================
// User Control Event Types
// RTMP spec section 5.4.1
// ============================================================================

/// Stream Begin - server sends when stream becomes functional
pub const UC_STREAM_BEGIN: u16 = 0;

/// Set Buffer Length - client tells server buffer size
pub const UC_SET_BUFFER_LENGTH: u16 = 3;

/// Stream Is Recorded
pub const UC_STREAM_IS_RECORDED: u16 = 4;

// ============================================================================
// Peer Bandwidth Limit Types
// RTMP spec section 5.4.5
// ============================================================================

/// Hard limit - peer should limit output to this bandwidth
pub const BANDWIDTH_LIMIT_HARD: u8 = 0;

/// Soft limit - peer can exceed if it has excess bandwidth
pub const BANDWIDTH_LIMIT_SOFT: u8 = 1;

/// Dynamic - can be hard or soft depending on prior state
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

// ============================================================================
// Common Command Names
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PLAY: &str = "play";
pub const CMD_PUBLISH: &str = "publish";

/// Internal response commands
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";

/// Status notification
pub const CMD_ON_STATUS: &str = "onStatus";

// Data commands
pub const CMD_ON_METADATA: &str = "onMetaData";
pub const CMD_SAMPLE_ACCESS: &str = "|RtmpSampleAccess";

// ============================================================================
// NetConnection / NetStream Status Codes
// ============================================================================

pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";

pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PLAY_START: &str = "NetStream.Play.Start";

// ============================================================================
// Flow-control defaults
// ============================================================================

/// Window acknowledgement size the server advertises after connect
pub const SERVER_WINDOW_ACK_SIZE: u32 = 5_000_000;

/// Peer bandwidth the server advertises after connect
pub const SERVER_PEER_BANDWIDTH: u32 = 5_000_000;

/// Window acknowledgement size the client answers with during connect
pub const CLIENT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Buffer length (ms) the client requests before play
pub const CLIENT_BUFFER_LENGTH_MS: u32 = 100;

//! rtmpcast: RTMP client/server engine
//!
//! Carries FLV-encapsulated audio/video between a publisher and a consumer
//! over TCP. One [`Conn`] per session multiplexes logical message streams
//! onto the connection with RTMP's chunked framing, speaks AMF0 for the
//! NetConnection/NetStream command exchange, and probes an initial window
//! of tags to derive codec descriptions before media flows.
//!
//! # Example: pull a stream
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> rtmpcast::Result<()> {
//!     let mut conn = rtmpcast::dial("rtmp://example.com/live/stream").await?;
//!     for stream in conn.streams().await? {
//!         println!("stream: {:?}", stream);
//!     }
//!     loop {
//!         let pkt = conn.read_packet().await?;
//!         println!("packet idx={} time={}ms", pkt.idx, pkt.time);
//!     }
//! }
//! ```
//!
//! # Example: accept one publisher
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> rtmpcast::Result<()> {
//!     let mut conn = rtmpcast::accept_publisher("0.0.0.0:1935").await?;
//!     loop {
//!         let pkt = conn.read_packet().await?;
//!         println!("got {} bytes at {}ms", pkt.data.len(), pkt.time);
//!     }
//! }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use amf::AmfValue;
pub use client::{dial, dial_timeout, RtmpUrl};
pub use error::{Error, Result};
pub use media::{CodecData, FlvTag, Packet};
pub use server::{accept_player, accept_publisher, Server, SessionHandler};
pub use session::Conn;

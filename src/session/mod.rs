//! RTMP session state machine
//!
//! One `Conn` per TCP connection, on either side of the socket. A session
//! advances through monotonic stages:
//!
//! ```text
//! Initial ──handshake──▶ HandshakeDone ──connect/createStream/publish|play──▶
//! CommandDone ──probe (reader) | write_header (writer)──▶ CodecDataDone
//! ```
//!
//! The public operations (`read_packet`, `write_packet`, `streams`,
//! `write_header`) drive whatever stages are still missing before doing
//! their work, so a client caller only ever sees packets: the handshake,
//! NetConnection and NetStream negotiation, and the codec probe all happen
//! on first use.
//!
//! There is no background reader; the read loop runs synchronously inside
//! the consumer's calls. Incoming SetChunkSize messages are applied to the
//! chunk decoder immediately and never surfaced.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf,
};

use crate::amf::AmfValue;
use crate::amf_object;
use crate::client::RtmpUrl;
use crate::error::{Error, ProtocolError, Result};
use crate::media::flv::{self, CodecData, FlvTag, Packet, Prober, SOUND_AAC, VIDEO_H264};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
use crate::protocol::constants::*;
use crate::protocol::handshake;
use crate::protocol::message::{Command, DataMessage, RtmpMessage, UserControlEvent};

/// Session stage; advances monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Initial,
    HandshakeDone,
    CommandDone,
    CodecDataDone,
}

/// Which way media flows for the operation driving the session forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Reading,
    Writing,
}

/// One RTMP session over a TCP (or in-memory) byte stream
pub struct Conn<S> {
    reader: ReadHalf<S>,
    writer: BufWriter<WriteHalf<S>>,

    /// Unparsed inbound bytes; the chunk decoder pulls from here
    read_buf: BytesMut,
    /// Scratch buffer for outbound chunking
    write_buf: BytesMut,

    decoder: ChunkDecoder,
    encoder: ChunkEncoder,

    is_server: bool,
    stage: Stage,
    publishing: bool,
    playing: bool,

    /// Connection URL: given by the caller (client) or reconstructed from
    /// the connect/publish/play commands (server)
    url: Option<RtmpUrl>,

    /// Message stream id carrying A/V traffic
    av_stream_id: u32,

    prober: Prober,
    streams: Vec<CodecData>,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn new(stream: S, is_server: bool, url: Option<RtmpUrl>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer: BufWriter::with_capacity(8 * 1024, writer),
            read_buf: BytesMut::with_capacity(8 * 1024),
            write_buf: BytesMut::new(),
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            is_server,
            stage: Stage::Initial,
            publishing: false,
            playing: false,
            url,
            av_stream_id: 1,
            prober: Prober::new(),
            streams: Vec::new(),
        }
    }

    /// Wrap the client side of a connection
    pub fn client(stream: S, url: RtmpUrl) -> Self {
        Self::new(stream, false, Some(url))
    }

    /// Wrap the server side of an accepted connection
    pub fn server(stream: S) -> Self {
        Self::new(stream, true, None)
    }

    /// Server side: run the handshake and command negotiation until the
    /// peer has issued publish or play
    pub async fn accept(&mut self) -> Result<()> {
        self.prepare(Stage::CommandDone, None).await
    }

    /// Whether the peer publishes into this connection
    pub fn is_publishing(&self) -> bool {
        self.publishing
    }

    /// Whether the peer plays from this connection
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The connection URL, once known
    pub fn url(&self) -> Option<&RtmpUrl> {
        self.url.as_ref()
    }

    // === Public media operations ===

    /// Read the next media packet, driving the session to the media-ready
    /// stage first (reader direction)
    pub async fn read_packet(&mut self) -> Result<Packet> {
        self.prepare(Stage::CodecDataDone, Some(Direction::Reading))
            .await?;

        if let Some(pkt) = self.prober.pop_packet() {
            return Ok(pkt);
        }

        loop {
            let (tag, timestamp) = self.poll_av_tag().await?;
            if let Some(pkt) = self.prober.tag_to_packet(&tag, timestamp) {
                return Ok(pkt);
            }
        }
    }

    /// The probed codec descriptions (reader direction)
    pub async fn streams(&mut self) -> Result<&[CodecData]> {
        self.prepare(Stage::CodecDataDone, Some(Direction::Reading))
            .await?;
        Ok(&self.streams)
    }

    /// Declare outbound streams: emits onMetaData and the codec-config tags
    /// (writer direction). Must precede `write_packet`.
    pub async fn write_header(&mut self, streams: &[CodecData]) -> Result<()> {
        self.prepare(Stage::CommandDone, Some(Direction::Writing))
            .await?;

        let mut metadata: HashMap<String, AmfValue> = HashMap::new();
        for stream in streams {
            match stream {
                CodecData::H264 { width, height, .. } => {
                    metadata.insert("videocodecid".into(), (VIDEO_H264 as u32).into());
                    metadata.insert("width".into(), (*width).into());
                    metadata.insert("height".into(), (*height).into());
                    metadata.insert("displayWidth".into(), (*width).into());
                    metadata.insert("displayHeight".into(), (*height).into());
                }
                CodecData::Aac { config } => {
                    metadata.insert("audiocodecid".into(), (SOUND_AAC as u32).into());
                    metadata.insert("audiosamplerate".into(), config.sampling_frequency.into());
                }
            }
        }

        let data = DataMessage {
            values: vec![
                AmfValue::String(CMD_ON_METADATA.into()),
                AmfValue::Object(metadata),
            ],
            stream_id: self.av_stream_id,
        };
        self.send_data(CSID_AV_COMMAND, self.av_stream_id, &data)
            .await?;

        for stream in streams {
            let tag = flv::codec_data_to_tag(stream);
            self.send_av_tag(&tag, 0).await?;
        }

        self.streams = streams.to_vec();
        self.stage = Stage::CodecDataDone;
        Ok(())
    }

    /// Write one media packet (writer direction); `write_header` must have
    /// declared the streams already
    pub async fn write_packet(&mut self, pkt: &Packet) -> Result<()> {
        self.prepare(Stage::CodecDataDone, Some(Direction::Writing))
            .await?;

        let stream = self
            .streams
            .get(pkt.idx)
            .ok_or(Error::InvalidState("packet stream index out of range"))?;
        let (tag, timestamp) = flv::packet_to_tag(pkt, stream);

        tracing::trace!(idx = pkt.idx, time = pkt.time, "write packet");
        self.send_av_tag(&tag, timestamp).await
    }

    /// Shut down the underlying stream. In-flight reads and writes on other
    /// tasks return an I/O error.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    // === Stage machine ===

    async fn prepare(&mut self, target: Stage, direction: Option<Direction>) -> Result<()> {
        while self.stage < target {
            match self.stage {
                Stage::Initial => {
                    if self.is_server {
                        self.handshake_server().await?;
                    } else {
                        self.handshake_client().await?;
                    }
                }
                Stage::HandshakeDone => {
                    if self.is_server {
                        self.recv_connect().await?;
                    } else {
                        match direction {
                            Some(Direction::Reading) => self.connect_play().await?,
                            Some(Direction::Writing) => self.connect_publish().await?,
                            None => {
                                return Err(Error::InvalidState(
                                    "client connection needs a read or write operation",
                                ))
                            }
                        }
                    }
                }
                Stage::CommandDone => match direction {
                    Some(Direction::Reading) => self.probe().await?,
                    _ => {
                        return Err(Error::InvalidState(
                            "call write_header() before write_packet()",
                        ))
                    }
                },
                Stage::CodecDataDone => unreachable!("terminal stage"),
            }
        }
        Ok(())
    }

    // === Handshake ===

    async fn handshake_client(&mut self) -> Result<()> {
        let c0c1 = handshake::client_request();
        self.writer.write_all(&c0c1).await?;
        self.writer.flush().await?;

        let s0s1s2 = self.read_exact_buf(handshake::RESPONSE_SIZE).await?;
        let c2 = handshake::client_response(&s0s1s2)?;
        self.writer.write_all(&c2).await?;
        self.writer.flush().await?;

        tracing::debug!("client handshake complete");
        self.stage = Stage::HandshakeDone;
        Ok(())
    }

    async fn handshake_server(&mut self) -> Result<()> {
        let c0c1 = self.read_exact_buf(handshake::REQUEST_SIZE).await?;
        let s0s1s2 = handshake::server_response(&c0c1)?;
        self.writer.write_all(&s0s1s2).await?;
        self.writer.flush().await?;

        let _c2 = self.read_exact_buf(HANDSHAKE_SIZE).await?;

        tracing::debug!("server handshake complete");
        self.stage = Stage::HandshakeDone;
        Ok(())
    }

    /// Take exactly `n` bytes off the connection, via the shared read buffer
    /// so no bytes are lost between the handshake and the chunk stream
    async fn read_exact_buf(&mut self, n: usize) -> Result<Bytes> {
        while self.read_buf.len() < n {
            let read = self.reader.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
        Ok(self.read_buf.split_to(n).freeze())
    }

    // === Server command negotiation ===

    async fn recv_connect(&mut self) -> Result<()> {
        // < connect("app")
        let cmd = self.poll_command().await?;
        if cmd.name != CMD_CONNECT {
            return Err(ProtocolError::InvalidCommand(format!(
                "first command is {:?}, not connect",
                cmd.name
            ))
            .into());
        }
        let app = cmd
            .command_object
            .get_string("app")
            .ok_or(ProtocolError::MissingField("app"))?
            .to_string();
        let tc_url = cmd
            .command_object
            .get_string("tcUrl")
            .or_else(|| cmd.command_object.get_string("tcurl"))
            .map(str::to_string);

        // > WindowAckSize, SetPeerBandwidth, SetChunkSize
        self.send_control(&RtmpMessage::WindowAckSize(SERVER_WINDOW_ACK_SIZE))
            .await?;
        self.send_control(&RtmpMessage::SetPeerBandwidth {
            size: SERVER_PEER_BANDWIDTH,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        })
        .await?;
        self.send_control(&RtmpMessage::SetChunkSize(SERVER_CHUNK_SIZE))
            .await?;
        self.encoder.set_chunk_size(SERVER_CHUNK_SIZE);

        // > _result("NetConnection.Connect.Success")
        let result = Command::result(
            cmd.transaction_id,
            amf_object! {
                "fmtVer" => "FMS/3,0,1,123",
                "capabilities" => 31.0,
            },
            amf_object! {
                "level" => "status",
                "code" => NC_CONNECT_SUCCESS,
                "description" => "Connection succeeded.",
                "objectEncoding" => 3.0,
            },
        );
        self.send_command(CSID_COMMAND, 0, &result).await?;
        tracing::info!(app = %app, "connect accepted");

        loop {
            let cmd = self.poll_command().await?;
            match cmd.name.as_str() {
                // < createStream  >  _result(streamid)
                CMD_CREATE_STREAM => {
                    self.av_stream_id = 1;
                    let result = Command::result(
                        cmd.transaction_id,
                        AmfValue::Null,
                        AmfValue::Number(self.av_stream_id as f64),
                    );
                    self.send_command(CSID_COMMAND, 0, &result).await?;
                }

                // < publish("path")  >  onStatus(Publish.Start)
                CMD_PUBLISH => {
                    let path = cmd
                        .arguments
                        .first()
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            ProtocolError::InvalidCommand("publish without a stream name".into())
                        })?
                        .to_string();

                    let status = Command::on_status(
                        cmd.transaction_id,
                        "status",
                        NS_PUBLISH_START,
                        "Start publishing",
                    );
                    self.send_command(CSID_AV_COMMAND, self.av_stream_id, &status)
                        .await?;

                    self.url = Some(RtmpUrl::from_parts(tc_url.as_deref(), &app, &path));
                    self.publishing = true;
                    self.stage = Stage::CommandDone;
                    tracing::info!(app = %app, stream = %path, "publish accepted");
                    return Ok(());
                }

                // < play("path")  >  StreamBegin, onStatus(Play.Start),
                //                    |RtmpSampleAccess
                CMD_PLAY => {
                    let path = cmd
                        .arguments
                        .first()
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| {
                            ProtocolError::InvalidCommand("play without a stream name".into())
                        })?
                        .to_string();

                    self.send_user_control(UserControlEvent::StreamBegin(self.av_stream_id))
                        .await?;

                    let status = Command::on_status(
                        cmd.transaction_id,
                        "status",
                        NS_PLAY_START,
                        "Start live",
                    );
                    self.send_command(CSID_AV_COMMAND, self.av_stream_id, &status)
                        .await?;

                    let access = DataMessage {
                        values: vec![
                            AmfValue::String(CMD_SAMPLE_ACCESS.into()),
                            AmfValue::Boolean(true),
                            AmfValue::Boolean(true),
                        ],
                        stream_id: self.av_stream_id,
                    };
                    self.send_data(CSID_AV_COMMAND, self.av_stream_id, &access)
                        .await?;

                    self.url = Some(RtmpUrl::from_parts(tc_url.as_deref(), &app, &path));
                    self.playing = true;
                    self.stage = Stage::CommandDone;
                    tracing::info!(app = %app, stream = %path, "play accepted");
                    return Ok(());
                }

                other => {
                    tracing::trace!(command = other, "ignored before publish/play");
                }
            }
        }
    }

    // === Client command negotiation ===

    /// > connect("app"), then wait for its _result. WindowAckSize control
    /// messages arriving meanwhile are answered immediately.
    async fn connect_command(&mut self, app: &str, tc_url: &str) -> Result<()> {
        tracing::debug!(app = %app, tc_url = %tc_url, "sending connect");
        let cmd = Command {
            name: CMD_CONNECT.to_string(),
            transaction_id: 1.0,
            command_object: amf_object! {
                "app" => app,
                "flashVer" => "MAC 22,0,0,192",
                "tcUrl" => tc_url,
                "fpad" => false,
                "capabilities" => 15.0,
                "audioCodecs" => 4071.0,
                "videoCodecs" => 252.0,
                "videoFunction" => 1.0,
            },
            arguments: vec![],
            stream_id: 0,
        };
        self.send_command(CSID_COMMAND, 0, &cmd).await?;

        loop {
            match self.poll_message().await? {
                RtmpMessage::Command(cmd) if cmd.name == CMD_RESULT => {
                    match cmd.info_code() {
                        Some(NC_CONNECT_SUCCESS) => return Ok(()),
                        code => {
                            return Err(Error::Rejected(format!(
                                "connect failed: {}",
                                code.unwrap_or("no status code")
                            )))
                        }
                    }
                }
                RtmpMessage::Command(cmd) if cmd.name == CMD_ERROR => {
                    return Err(Error::Rejected(format!(
                        "connect failed: {}",
                        cmd.info_code().unwrap_or("_error")
                    )));
                }
                RtmpMessage::WindowAckSize(_) => {
                    self.send_control(&RtmpMessage::WindowAckSize(CLIENT_WINDOW_ACK_SIZE))
                        .await?;
                }
                _ => {}
            }
        }
    }

    /// > createStream(), then wait for the _result carrying the A/V message
    /// stream id
    async fn create_stream(&mut self) -> Result<()> {
        tracing::debug!("sending createStream");
        let cmd = Command {
            name: CMD_CREATE_STREAM.to_string(),
            transaction_id: 2.0,
            command_object: AmfValue::Null,
            arguments: vec![],
            stream_id: 0,
        };
        self.send_command(CSID_COMMAND, 0, &cmd).await?;
        Ok(())
    }

    async fn await_create_stream_result(&mut self) -> Result<()> {
        loop {
            let cmd = self.poll_command().await?;
            if cmd.name == CMD_RESULT {
                let stream_id = cmd
                    .arguments
                    .first()
                    .and_then(|v| v.as_number())
                    .ok_or_else(|| {
                        Error::Rejected("createStream result without a stream id".into())
                    })?;
                self.av_stream_id = stream_id as u32;
                return Ok(());
            }
        }
    }

    async fn connect_publish(&mut self) -> Result<()> {
        let url = self
            .url
            .clone()
            .ok_or(Error::InvalidState("client connection has no URL"))?;

        self.connect_command(&url.app, &url.tc_url()).await?;
        self.create_stream().await?;
        self.await_create_stream_result().await?;

        // > publish("stream")
        tracing::debug!(stream = %url.stream, "sending publish");
        let cmd = Command {
            name: CMD_PUBLISH.to_string(),
            transaction_id: 3.0,
            command_object: AmfValue::Null,
            arguments: vec![AmfValue::String(url.stream.clone())],
            stream_id: self.av_stream_id,
        };
        self.send_command(CSID_STREAM_COMMAND, self.av_stream_id, &cmd)
            .await?;

        self.publishing = true;
        self.stage = Stage::CommandDone;
        Ok(())
    }

    async fn connect_play(&mut self) -> Result<()> {
        let url = self
            .url
            .clone()
            .ok_or(Error::InvalidState("client connection has no URL"))?;

        self.connect_command(&url.app, &url.tc_url()).await?;
        self.create_stream().await?;

        // > SetBufferLength 0,100ms
        self.send_user_control(UserControlEvent::SetBufferLength {
            stream_id: 0,
            buffer_ms: CLIENT_BUFFER_LENGTH_MS,
        })
        .await?;

        self.await_create_stream_result().await?;

        // > play("stream")
        tracing::debug!(stream = %url.stream, "sending play");
        let cmd = Command {
            name: CMD_PLAY.to_string(),
            transaction_id: 0.0,
            command_object: AmfValue::Null,
            arguments: vec![AmfValue::String(url.stream.clone())],
            stream_id: self.av_stream_id,
        };
        self.send_command(CSID_STREAM_COMMAND, self.av_stream_id, &cmd)
            .await?;

        self.playing = true;
        self.stage = Stage::CommandDone;
        Ok(())
    }

    // === Codec probe ===

    async fn probe(&mut self) -> Result<()> {
        while !self.prober.probed() {
            let (tag, timestamp) = self.poll_av_tag().await?;
            self.prober.push_tag(&tag, timestamp)?;
        }
        self.streams = self.prober.streams.clone();
        self.stage = Stage::CodecDataDone;
        tracing::debug!(streams = self.streams.len(), "probe complete");
        Ok(())
    }

    // === Message polling ===

    /// Pull the next complete message off the wire. SetChunkSize is applied
    /// to the decoder and swallowed; everything else is surfaced.
    async fn poll_message(&mut self) -> Result<RtmpMessage> {
        loop {
            while let Some(raw) = self.decoder.decode(&mut self.read_buf)? {
                match RtmpMessage::from_raw(&raw)? {
                    RtmpMessage::SetChunkSize(size) => {
                        tracing::debug!(size, "peer set chunk size");
                        self.decoder.set_chunk_size(size);
                    }
                    msg => return Ok(msg),
                }
            }

            let n = self.reader.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    async fn poll_command(&mut self) -> Result<Command> {
        loop {
            if let RtmpMessage::Command(cmd) = self.poll_message().await? {
                return Ok(cmd);
            }
        }
    }

    /// Poll until the next audio or video tag, returning it with its
    /// message timestamp
    async fn poll_av_tag(&mut self) -> Result<(FlvTag, u32)> {
        loop {
            match self.poll_message().await? {
                RtmpMessage::Video { timestamp, data } => {
                    return Ok((FlvTag::video(data), timestamp))
                }
                RtmpMessage::Audio { timestamp, data } => {
                    return Ok((FlvTag::audio(data), timestamp))
                }
                _ => {}
            }
        }
    }

    // === Message sending ===

    async fn send_message(
        &mut self,
        csid: u32,
        stream_id: u32,
        timestamp: u32,
        msg: &RtmpMessage,
    ) -> Result<()> {
        let (message_type, payload) = msg.encode();
        let raw = RawMessage {
            csid,
            timestamp,
            message_type,
            stream_id,
            payload,
        };
        self.write_buf.clear();
        self.encoder.encode(&raw, &mut self.write_buf)?;
        self.writer.write_all(&self.write_buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_command(&mut self, csid: u32, stream_id: u32, cmd: &Command) -> Result<()> {
        self.send_message(csid, stream_id, 0, &RtmpMessage::Command(cmd.clone()))
            .await
    }

    async fn send_data(&mut self, csid: u32, stream_id: u32, data: &DataMessage) -> Result<()> {
        self.send_message(csid, stream_id, 0, &RtmpMessage::Data(data.clone()))
            .await
    }

    /// Protocol control: csid 2, message stream 0
    async fn send_control(&mut self, msg: &RtmpMessage) -> Result<()> {
        self.send_message(CSID_PROTOCOL_CONTROL, 0, 0, msg).await
    }

    async fn send_user_control(&mut self, event: UserControlEvent) -> Result<()> {
        self.send_control(&RtmpMessage::UserControl(event)).await
    }

    /// Audio on csid 6, video on csid 7, both on the A/V message stream
    async fn send_av_tag(&mut self, tag: &FlvTag, timestamp: u32) -> Result<()> {
        let (csid, msg) = match tag.tag_type {
            flv::FlvTagType::Video => (
                CSID_VIDEO,
                RtmpMessage::Video {
                    timestamp,
                    data: tag.data.clone(),
                },
            ),
            flv::FlvTagType::Audio => (
                CSID_AUDIO,
                RtmpMessage::Audio {
                    timestamp,
                    data: tag.data.clone(),
                },
            ),
        };
        self.send_message(csid, self.av_stream_id, timestamp, &msg)
            .await
    }
}

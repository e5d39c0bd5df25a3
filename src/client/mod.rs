//! RTMP client entry points
//!
//! `dial` / `dial_timeout` open a TCP connection and return a `Conn` in its
//! initial stage; the handshake and command negotiation run on the first
//! media operation. The timeout bounds TCP connect only - once connected,
//! reads and writes block until either side closes.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::constants::RTMP_PORT;
use crate::session::Conn;

/// Components of an `rtmp://host[:port]/app/stream` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream: String,
}

impl RtmpUrl {
    /// Parse an RTMP URL, inserting the default port when absent
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("rtmp://")
            .ok_or_else(|| Error::Url(format!("not an rtmp:// URL: {}", url)))?;

        let (host_port, path) = match rest.split_once('/') {
            Some((hp, path)) => (hp, path),
            None => (rest, ""),
        };
        if host_port.is_empty() {
            return Err(Error::Url(format!("missing host: {}", url)));
        }

        let (host, port) = match host_port.split_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse()
                    .map_err(|_| Error::Url(format!("bad port: {}", p)))?;
                (h.to_string(), port)
            }
            None => (host_port.to_string(), RTMP_PORT),
        };

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let app = segments.next().unwrap_or("").to_string();
        let stream = segments.collect::<Vec<_>>().join("/");

        Ok(RtmpUrl {
            host,
            port,
            app,
            stream,
        })
    }

    /// Reconstruct a URL from the connect tcUrl plus the command paths, the
    /// way the server records what a peer asked for
    pub(crate) fn from_parts(tc_url: Option<&str>, app: &str, stream: &str) -> Self {
        let (host, port) = tc_url
            .and_then(|u| RtmpUrl::parse(u).ok())
            .map(|u| (u.host, u.port))
            .unwrap_or_else(|| (String::new(), RTMP_PORT));

        RtmpUrl {
            host,
            port,
            app: app.to_string(),
            stream: stream.to_string(),
        }
    }

    /// The tcUrl sent in connect: `rtmp://host[:port]/app`
    pub fn tc_url(&self) -> String {
        format!("rtmp://{}:{}/{}", self.host, self.port, self.app)
    }

    /// The TCP address to dial
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connect to an RTMP server with no dial timeout
pub async fn dial(url: &str) -> Result<Conn<TcpStream>> {
    let parsed = RtmpUrl::parse(url)?;
    let socket = TcpStream::connect(parsed.addr()).await?;
    socket.set_nodelay(true)?;
    tracing::debug!(addr = %parsed.addr(), "connected");
    Ok(Conn::client(socket, parsed))
}

/// Connect to an RTMP server, bounding TCP connect by `limit`
pub async fn dial_timeout(url: &str, limit: Duration) -> Result<Conn<TcpStream>> {
    let parsed = RtmpUrl::parse(url)?;
    let socket = timeout(limit, TcpStream::connect(parsed.addr()))
        .await
        .map_err(|_| Error::Timeout)??;
    socket.set_nodelay(true)?;
    tracing::debug!(addr = %parsed.addr(), "connected");
    Ok(Conn::client(socket, parsed))
}

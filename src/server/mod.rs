//! RTMP server harness
//!
//! `Server` owns the TCP accept loop and spawns one task per connection.
//! Each task drives the session to the command-done stage, then hands the
//! connection to the application handler according to the role the peer
//! negotiated (publish or play). Connections never share state; the accept
//! loop only hands off `Conn` values.
//!
//! For one-shot pipelines there are rendezvous helpers that accept
//! connections until the first publisher (or player) completes negotiation
//! and return that connection to the caller; ownership transfer over the
//! channel replaces any explicit close-signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::session::Conn;

/// Application callbacks for negotiated sessions
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Called when a peer starts publishing into `conn`. Read packets from
    /// the connection until done; returning closes it.
    async fn on_publish(&self, conn: &mut Conn<TcpStream>) -> Result<()> {
        let _ = conn;
        Ok(())
    }

    /// Called when a peer starts playing from `conn`. Write a header and
    /// packets into the connection; returning closes it.
    async fn on_play(&self, conn: &mut Conn<TcpStream>) -> Result<()> {
        let _ = conn;
        Ok(())
    }
}

/// RTMP server: accept loop plus per-connection session tasks
pub struct Server<H> {
    addr: String,
    handler: Arc<H>,
}

impl<H: SessionHandler> Server<H> {
    /// Create a server for the given listen address (e.g. "0.0.0.0:1935")
    pub fn new(addr: impl Into<String>, handler: H) -> Self {
        Self {
            addr: addr.into(),
            handler: Arc::new(handler),
        }
    }

    /// Bind and serve until the listener fails
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        tracing::info!(addr = %self.addr, "RTMP server listening");
        self.run_on(listener).await
    }

    /// Serve on an already-bound listener
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let _ = socket.set_nodelay(true);
                    let handler = Arc::clone(&self.handler);

                    tokio::spawn(async move {
                        tracing::debug!(peer = %peer_addr, "accepted");
                        if let Err(e) = handle_session(socket, handler).await {
                            tracing::debug!(peer = %peer_addr, error = %e, "session ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_session<H: SessionHandler>(socket: TcpStream, handler: Arc<H>) -> Result<()> {
    let mut conn = Conn::server(socket);
    conn.accept().await?;

    if conn.is_publishing() {
        handler.on_publish(&mut conn).await?;
    } else if conn.is_playing() {
        handler.on_play(&mut conn).await?;
    }

    conn.close().await
}

/// Accept connections on `addr` until one finishes publish negotiation,
/// then hand that connection to the caller
pub async fn accept_publisher(addr: &str) -> Result<Conn<TcpStream>> {
    let listener = TcpListener::bind(addr).await?;
    accept_publisher_on(listener).await
}

/// Accept connections on `addr` until one finishes play negotiation, then
/// hand that connection to the caller
pub async fn accept_player(addr: &str) -> Result<Conn<TcpStream>> {
    let listener = TcpListener::bind(addr).await?;
    accept_player_on(listener).await
}

/// `accept_publisher` on an already-bound listener
pub async fn accept_publisher_on(listener: TcpListener) -> Result<Conn<TcpStream>> {
    accept_role(listener, true).await
}

/// `accept_player` on an already-bound listener
pub async fn accept_player_on(listener: TcpListener) -> Result<Conn<TcpStream>> {
    accept_role(listener, false).await
}

async fn accept_role(listener: TcpListener, want_publisher: bool) -> Result<Conn<TcpStream>> {
    let (tx, mut rx) = mpsc::channel::<Conn<TcpStream>>(1);

    let accept_task = tokio::spawn(async move {
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    return;
                }
            };
            let _ = socket.set_nodelay(true);

            let tx = tx.clone();
            tokio::spawn(async move {
                let mut conn = Conn::server(socket);
                match conn.accept().await {
                    Ok(()) if conn.is_publishing() == want_publisher => {
                        let _ = tx.send(conn).await;
                    }
                    Ok(()) => {
                        tracing::debug!(peer = %peer_addr, "wrong role, dropping");
                        let _ = conn.close().await;
                    }
                    Err(e) => {
                        tracing::debug!(peer = %peer_addr, error = %e, "negotiation failed");
                    }
                }
            });
        }
    });

    let conn = rx.recv().await.ok_or(Error::ConnectionClosed);
    accept_task.abort();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::dial;
    use crate::media::flv::CodecData;
    use crate::media::h264::tests::avc_record;
    use crate::media::Packet;
    use bytes::Bytes;

    struct CollectHandler {
        tx: mpsc::Sender<Packet>,
    }

    #[async_trait]
    impl SessionHandler for CollectHandler {
        async fn on_publish(&self, conn: &mut Conn<TcpStream>) -> Result<()> {
            let pkt = conn.read_packet().await?;
            self.tx.send(pkt).await.ok();
            Ok(())
        }
    }

    async fn publish_one(url: &str) {
        let video = CodecData::from_avc_record(avc_record()).unwrap();
        let mut conn = dial(url).await.unwrap();
        conn.write_header(&[video]).await.unwrap();
        conn.write_packet(&Packet {
            idx: 0,
            time: 0,
            composition_time: 0,
            is_keyframe: true,
            data: Bytes::from_static(&[0, 0, 0, 2, 0x65, 0x88]),
        })
        .await
        .unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let server = Server::new(addr.to_string(), CollectHandler { tx });
        tokio::spawn(async move { server.run_on(listener).await });

        publish_one(&format!("rtmp://{}/live/x", addr)).await;

        let pkt = rx.recv().await.expect("handler should surface a packet");
        assert!(pkt.is_keyframe);
        assert_eq!(pkt.idx, 0);
    }

    #[tokio::test]
    async fn test_accept_publisher_rendezvous() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let url = format!("rtmp://{}/live/x", addr);
        let publisher = tokio::spawn(async move { publish_one(&url).await });

        let mut conn = accept_publisher_on(listener).await.unwrap();
        assert!(conn.is_publishing());
        assert_eq!(conn.url().unwrap().stream, "x");

        let streams = conn.streams().await.unwrap();
        assert_eq!(streams.len(), 1);
        let pkt = conn.read_packet().await.unwrap();
        assert!(pkt.is_keyframe);

        conn.close().await.unwrap();
        publisher.await.unwrap();
    }
}

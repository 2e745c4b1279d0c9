//! Local venue stub shared by the integration tests.
//!
//! Accepts plaintext connections, decodes client frames and writes venue
//! messages with their own sequence numbers.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use venue_session_engine::infrastructure::fix::codec::decode;
use venue_session_engine::infrastructure::fix::{
    FixFrameCodec, InboundHandler, MsgType, OutboundHeader, ReconnectConfig, SequenceStore,
    SessionConfig, SessionControl, SessionController, TransportConfig, WireMessage,
    WireMessageBuilder, tags,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// Listening side of the stub.
pub struct VenueStub {
    listener: TcpListener,
    port: u16,
}

impl VenueStub {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub async fn accept(&self) -> VenueConnection {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("client did not connect")
            .unwrap();
        let (read, write) = stream.into_split();
        VenueConnection {
            reader: FramedRead::new(read, FixFrameCodec::new()),
            writer: write,
            seq: 1,
        }
    }
}

/// One accepted client connection.
pub struct VenueConnection {
    reader: FramedRead<OwnedReadHalf, FixFrameCodec>,
    writer: OwnedWriteHalf,
    seq: u64,
}

impl VenueConnection {
    /// Next client frame.
    pub async fn recv(&mut self) -> WireMessage {
        let frame = timeout(WAIT, self.reader.next())
            .await
            .expect("no frame from client")
            .expect("client closed the connection")
            .unwrap();
        decode(&frame).unwrap()
    }

    /// Next client frame of `msg_type`, skipping heartbeats.
    pub async fn recv_type(&mut self, msg_type: MsgType) -> WireMessage {
        loop {
            let msg = self.recv().await;
            if msg.msg_type() == msg_type {
                return msg;
            }
            assert_eq!(msg.msg_type(), MsgType::Heartbeat, "unexpected {}", msg.to_log_string());
        }
    }

    /// Whether the client closed its side within `wait`.
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        matches!(timeout(wait, self.reader.next()).await, Ok(None | Some(Err(_))))
    }

    /// Whether no frame arrives within `wait`.
    pub async fn silent_for(&mut self, wait: Duration) -> bool {
        timeout(wait, self.reader.next()).await.is_err()
    }

    pub async fn send(&mut self, body: WireMessageBuilder) {
        let msg = body.build(&OutboundHeader {
            sender_comp_id: "VENUE",
            target_comp_id: "CLIENT",
            seq_num: self.seq,
            sending_time: Utc::now(),
            poss_dup: false,
        });
        self.seq += 1;
        self.writer.write_all(&msg.encode()).await.unwrap();
    }

    /// Read the client's Logon and acknowledge it.
    pub async fn accept_logon(&mut self) -> WireMessage {
        let logon = self.recv_type(MsgType::Logon).await;
        self.send(WireMessageBuilder::new(MsgType::Logon).field(tags::HEART_BT_INT, 30).field(tags::ENCRYPT_METHOD, 0))
            .await;
        logon
    }
}

/// Handler that only decodes session-level messages.
pub struct SessionOnly;

#[async_trait::async_trait]
impl InboundHandler for SessionOnly {
    async fn on_message(&self, msg: WireMessage) -> Option<SessionControl> {
        SessionControl::from_message(&msg)
    }
}

/// Session config pointed at the stub with a short reconnect delay.
pub fn session_config(port: u16) -> SessionConfig {
    let mut config = SessionConfig::new(
        "pricing",
        "CLIENT",
        "VENUE",
        TransportConfig::plaintext("127.0.0.1", port),
    );
    config.reconnect = ReconnectConfig::fixed(Duration::from_millis(100));
    config.logon_timeout = Duration::from_secs(2);
    config.logout_timeout = Duration::from_millis(500);
    config
}

pub async fn session(
    port: u16,
    store: Arc<dyn SequenceStore>,
    handler: Arc<dyn InboundHandler>,
) -> Arc<SessionController> {
    session_with(session_config(port), store, handler).await
}

pub async fn session_with(
    config: SessionConfig,
    store: Arc<dyn SequenceStore>,
    handler: Arc<dyn InboundHandler>,
) -> Arc<SessionController> {
    SessionController::new(config, store, handler, CancellationToken::new())
        .await
        .unwrap()
}

/// Poll `check` until it holds or the wait runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

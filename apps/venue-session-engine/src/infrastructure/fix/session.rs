//! Session Controller
//!
//! Owns one sequenced FIX session: connect, logon, heartbeats, test
//! requests, resend/gap-fill, logout and automatic reconnect.
//!
//! # Phases
//!
//! ```text
//! Disconnected -> Connecting -> LoggedOn -> LoggingOut -> Disconnected
//! ```
//!
//! # Tasks
//!
//! Each connection runs one receive task and one heartbeat ticker. The
//! receive task decodes frames, hands them to the [`InboundHandler`] and acts
//! on the [`SessionControl`] it returns. Heartbeat events are consumed by the
//! same task so every session-level send goes through the one send path.
//!
//! # Sequencing
//!
//! All outbound writes take the per-session send mutex. The next sequence
//! number is persisted before the socket write; a persist failure aborts the
//! send and a write failure restores the previous value and drops the
//! connection.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::auth::{self, Credentials, LogonOutcome};
use super::codec::{OutboundHeader, WireMessage, WireMessageBuilder};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::message_log::{Direction, MessageLog};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::sequence::{INITIAL_SEQUENCE, SequenceError, SequenceStore};
use super::tags::{self, MsgType};
use super::transport::{ConnectError, SendError, Transport, TransportConfig, TransportReader, TransportWriter};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Label used in logs, metrics and health output.
    pub name: String,
    /// SenderCompID (49).
    pub sender_comp_id: String,
    /// TargetCompID (56).
    pub target_comp_id: String,
    /// Socket settings.
    pub transport: TransportConfig,
    /// HeartBtInt (108).
    pub heartbeat_interval: Duration,
    /// Send ResetSeqNumFlag=Y on logon and restart at 1.
    pub reset_on_logon: bool,
    /// Bound on the Logon reply.
    pub logon_timeout: Duration,
    /// Bound on the Logout confirmation.
    pub logout_timeout: Duration,
    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectConfig,
    /// Raw message log; `None` disables it.
    pub message_log: Option<PathBuf>,
}

impl SessionConfig {
    /// Defaults for everything except identity and address.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
        transport: TransportConfig,
    ) -> Self {
        Self {
            name: name.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            transport,
            heartbeat_interval: Duration::from_secs(30),
            reset_on_logon: false,
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            message_log: None,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Session failures surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No connection is open.
    #[error("session is not connected")]
    NotConnected,

    /// Connected but not logged on.
    #[error("session is not logged on")]
    NotLoggedOn,

    /// Opening the transport failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Writing to the socket failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The sequence counter could not be stored; nothing was sent.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Venue answered Logon with Logout.
    #[error("logon rejected: {0}")]
    LogonRejected(String),

    /// No Logon reply in time.
    #[error("logon timed out after {0:?}")]
    LogonTimeout(Duration),

    /// The connection dropped during logon.
    #[error("connection lost during logon")]
    ConnectionLost,
}

// =============================================================================
// Session Control
// =============================================================================

/// Session-level message decoded for the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionControl {
    /// Logon acknowledgement.
    Logon {
        /// HeartBtInt echoed by the venue.
        heartbeat_secs: Option<u64>,
    },
    /// Heartbeat, possibly answering a TestRequest.
    Heartbeat {
        /// TestReqID being answered.
        test_req_id: Option<String>,
    },
    /// TestRequest that must be echoed.
    TestRequest {
        /// TestReqID to echo.
        test_req_id: String,
    },
    /// ResendRequest for outbound messages.
    ResendRequest {
        /// BeginSeqNo (7).
        begin: u64,
        /// EndSeqNo (16); 0 means infinity.
        end: u64,
    },
    /// Inbound SequenceReset.
    SequenceReset {
        /// NewSeqNo (36).
        new_seq: u64,
        /// GapFillFlag (123).
        gap_fill: bool,
    },
    /// Logout.
    Logout {
        /// Text (58).
        text: Option<String>,
    },
    /// Session-level Reject.
    Reject {
        /// RefSeqNum (45).
        ref_seq: Option<u64>,
        /// SessionRejectReason (373).
        reason: Option<u32>,
        /// Text (58).
        text: Option<String>,
    },
}

impl SessionControl {
    /// Decode a session-level message.
    ///
    /// Returns `None` for application messages and for session messages
    /// missing a required tag.
    #[must_use]
    pub fn from_message(msg: &WireMessage) -> Option<Self> {
        let text = || msg.get(tags::TEXT).map(str::to_string);
        match msg.msg_type() {
            MsgType::Logon => Some(Self::Logon {
                heartbeat_secs: msg.get_parsed(tags::HEART_BT_INT),
            }),
            MsgType::Heartbeat => Some(Self::Heartbeat {
                test_req_id: msg.get(tags::TEST_REQ_ID).map(str::to_string),
            }),
            MsgType::TestRequest => msg.get(tags::TEST_REQ_ID).map(|id| Self::TestRequest {
                test_req_id: id.to_string(),
            }),
            MsgType::ResendRequest => Some(Self::ResendRequest {
                begin: msg.get_parsed(tags::BEGIN_SEQ_NO)?,
                end: msg.get_parsed(tags::END_SEQ_NO).unwrap_or(0),
            }),
            MsgType::SequenceReset => Some(Self::SequenceReset {
                new_seq: msg.get_parsed(tags::NEW_SEQ_NO)?,
                gap_fill: msg.get_flag(tags::GAP_FILL_FLAG),
            }),
            MsgType::Logout => Some(Self::Logout { text: text() }),
            MsgType::Reject => Some(Self::Reject {
                ref_seq: msg.get_parsed(tags::REF_SEQ_NUM),
                reason: msg.get_parsed(tags::SESSION_REJECT_REASON),
                text: text(),
            }),
            _ => None,
        }
    }
}

/// Consumer of inbound messages.
///
/// Returns the session-level control the controller must act on, if any.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one decoded message.
    async fn on_message(&self, msg: WireMessage) -> Option<SessionControl>;
}

// =============================================================================
// Status
// =============================================================================

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No connection.
    Disconnected,
    /// Transport open, Logon in flight.
    Connecting,
    /// Logon acknowledged.
    LoggedOn,
    /// Logout sent, awaiting confirmation.
    LoggingOut,
}

/// Point-in-time snapshot for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Session label.
    pub name: String,
    /// Current phase.
    pub phase: SessionPhase,
    /// Next outbound MsgSeqNum.
    pub next_out_seq: u64,
    /// Last inbound MsgSeqNum seen on this connection.
    pub last_inbound_seq: Option<u64>,
    /// Reconnect attempts since start.
    pub reconnect_attempts: u64,
    /// Messages written.
    pub messages_sent: u64,
    /// Messages received.
    pub messages_received: u64,
    /// Time of the last successful logon.
    pub logged_on_at: Option<DateTime<Utc>>,
    /// Reason for the last disconnect or failure.
    pub last_error: Option<String>,
}

// =============================================================================
// Controller
// =============================================================================

struct Outbound {
    writer: Option<TransportWriter>,
    connection_id: u64,
    next_out_seq: u64,
}

struct ActiveConnection {
    id: u64,
    cancel: CancellationToken,
}

/// One FIX session.
pub struct SessionController {
    config: SessionConfig,
    me: Weak<Self>,
    store: Arc<dyn SequenceStore>,
    handler: Arc<dyn InboundHandler>,
    outbound: Mutex<Outbound>,
    connect_lock: Mutex<()>,
    status: RwLock<SessionStatus>,
    credentials: RwLock<Option<Credentials>>,
    connection: SyncMutex<Option<ActiveConnection>>,
    pending_logon: SyncMutex<Option<oneshot::Sender<LogonOutcome>>>,
    heartbeat: Arc<HeartbeatState>,
    logout_notify: Notify,
    reconnect_policy: SyncMutex<ReconnectPolicy>,
    auto_reconnect: AtomicBool,
    reconnecting: AtomicBool,
    connection_seq: AtomicU64,
    shutdown: CancellationToken,
    message_log: Option<MessageLog>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("name", &self.config.name)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a session, loading the stored outbound sequence number.
    ///
    /// `shutdown` stops the reconnect loop and every connection task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Sequence` if the stored counter cannot be read.
    pub async fn new(
        config: SessionConfig,
        store: Arc<dyn SequenceStore>,
        handler: Arc<dyn InboundHandler>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, SessionError> {
        let next_out_seq = store.load().await?;
        let message_log = MessageLog::open_optional(config.message_log.as_deref()).await;

        tracing::info!(
            session = %config.name,
            sender = %config.sender_comp_id,
            target = %config.target_comp_id,
            next_out_seq,
            "Session created"
        );

        Ok(Arc::new_cyclic(|me| Self {
            status: RwLock::new(SessionStatus {
                name: config.name.clone(),
                phase: SessionPhase::Disconnected,
                next_out_seq,
                last_inbound_seq: None,
                reconnect_attempts: 0,
                messages_sent: 0,
                messages_received: 0,
                logged_on_at: None,
                last_error: None,
            }),
            reconnect_policy: SyncMutex::new(ReconnectPolicy::new(config.reconnect.clone())),
            config,
            me: me.clone(),
            store,
            handler,
            outbound: Mutex::new(Outbound {
                writer: None,
                connection_id: 0,
                next_out_seq,
            }),
            connect_lock: Mutex::new(()),
            credentials: RwLock::new(None),
            connection: SyncMutex::new(None),
            pending_logon: SyncMutex::new(None),
            heartbeat: Arc::new(HeartbeatState::new()),
            logout_notify: Notify::new(),
            auto_reconnect: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            connection_seq: AtomicU64::new(0),
            shutdown,
            message_log,
        }))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Session label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.status.read().phase
    }

    /// Whether application messages can be sent.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.phase() == SessionPhase::LoggedOn
    }

    /// Status snapshot.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    /// Next outbound sequence number.
    pub async fn next_out_seq(&self) -> u64 {
        self.outbound.lock().await.next_out_seq
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = {
            let mut status = self.status.write();
            std::mem::replace(&mut status.phase, phase)
        };
        if previous != phase {
            tracing::debug!(session = %self.config.name, from = ?previous, to = ?phase, "Session phase change");
            metrics::set_session_logged_on(&self.config.name, phase == SessionPhase::LoggedOn);
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Store credentials and log on, connecting if needed.
    ///
    /// The credentials are replayed on every automatic reconnect.
    ///
    /// # Errors
    ///
    /// Returns the connect or logon failure. A reconnect is still scheduled.
    pub async fn logon(&self, credentials: Credentials) -> Result<(), SessionError> {
        tracing::info!(session = %self.config.name, username = %credentials.username, "Logon requested");
        *self.credentials.write() = Some(credentials);
        if self.is_logged_on() {
            tracing::info!(session = %self.config.name, "Already logged on, credentials kept for reconnect");
            return Ok(());
        }
        self.connect().await
    }

    /// Connect and log on with the stored credentials (if any).
    ///
    /// Enables automatic reconnect.
    ///
    /// # Errors
    ///
    /// Returns the connect or logon failure. A reconnect is still scheduled.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.auto_reconnect.store(true, Ordering::SeqCst);
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(session = %self.config.name, error = %e, "Connect failed");
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Send Logout, wait a bounded time for the venue's Logout, then disconnect.
    ///
    /// Inbound messages keep being dispatched while waiting.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoggedOn` if there was no session to log out
    /// of. The connection is torn down either way.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        if !self.is_logged_on() {
            self.disconnect().await;
            return Err(SessionError::NotLoggedOn);
        }
        self.set_phase(SessionPhase::LoggingOut);

        let confirmed = self.logout_notify.notified();
        tokio::pin!(confirmed);
        confirmed.as_mut().enable();

        match self.send_internal(&WireMessageBuilder::new(MsgType::Logout)).await {
            Ok(_) => match tokio::time::timeout(self.config.logout_timeout, confirmed).await {
                Ok(()) => tracing::info!(session = %self.config.name, "Logout confirmed"),
                Err(_) => tracing::warn!(
                    session = %self.config.name,
                    timeout_ms = self.config.logout_timeout.as_millis(),
                    "No Logout confirmation from venue"
                ),
            },
            Err(e) => tracing::warn!(session = %self.config.name, error = %e, "Logout send failed"),
        }

        self.disconnect().await;
        Ok(())
    }

    /// Close the connection and disable automatic reconnect. Idempotent.
    pub async fn disconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        let active = self.connection.lock().take();
        if let Some(active) = active {
            active.cancel.cancel();
        }
        drop(self.pending_logon.lock().take());

        let writer = self.outbound.lock().await.writer.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await;
        }
        if self.phase() != SessionPhase::Disconnected {
            self.set_phase(SessionPhase::Disconnected);
            tracing::info!(session = %self.config.name, "Session disconnected");
        }
    }

    async fn establish(&self) -> Result<(), SessionError> {
        let _connecting = self.connect_lock.lock().await;
        if self.is_logged_on() {
            if self.connection.lock().is_some() {
                return Ok(());
            }
            tracing::warn!(session = %self.config.name, "Logged on without a connection, reconnecting");
            self.set_phase(SessionPhase::Disconnected);
        }
        let Some(me) = self.me.upgrade() else {
            return Err(SessionError::NotConnected);
        };

        self.set_phase(SessionPhase::Connecting);
        let (reader, writer) = match Transport::connect(&self.config.transport).await {
            Ok(halves) => halves,
            Err(e) => {
                self.set_phase(SessionPhase::Disconnected);
                self.status.write().last_error = Some(e.to_string());
                return Err(e.into());
            }
        };

        let id = self.connection_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.shutdown.child_token();
        {
            let mut out = self.outbound.lock().await;
            out.writer = Some(writer);
            out.connection_id = id;
        }
        *self.connection.lock() = Some(ActiveConnection {
            id,
            cancel: cancel.clone(),
        });
        self.heartbeat.reset();
        self.status.write().last_inbound_seq = None;

        let (logon_tx, logon_rx) = oneshot::channel();
        *self.pending_logon.lock() = Some(logon_tx);
        let (hb_tx, hb_rx) = mpsc::channel(8);
        tokio::spawn(me.run_connection(id, reader, hb_rx, cancel.clone()));

        let credentials = self.credentials.read().clone();
        let body = auth::logon_body(
            credentials.as_ref(),
            self.config.heartbeat_interval.as_secs(),
            self.config.reset_on_logon,
        );
        let sent = {
            let mut out = self.outbound.lock().await;
            if self.config.reset_on_logon {
                self.reset_outbound_sequence(&mut out).await
            } else {
                Ok(())
            }
        };
        let sent = match sent {
            Ok(()) => self.send_internal(&body).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.connection_lost(id, &format!("logon send failed: {e}"));
            return Err(e);
        }

        match tokio::time::timeout(self.config.logon_timeout, logon_rx).await {
            Ok(Ok(LogonOutcome::Accepted { heartbeat_secs })) => {
                if let Some(venue_secs) = heartbeat_secs
                    && venue_secs != self.config.heartbeat_interval.as_secs()
                {
                    tracing::info!(
                        session = %self.config.name,
                        venue_secs,
                        "Venue echoed a different heartbeat interval"
                    );
                }
                {
                    // LoggedOn is only set while connection `id` is still active.
                    let active = self.connection.lock();
                    if !active.as_ref().is_some_and(|conn| conn.id == id) {
                        return Err(SessionError::ConnectionLost);
                    }
                    {
                        let mut status = self.status.write();
                        status.logged_on_at = Some(Utc::now());
                        status.last_error = None;
                    }
                    self.set_phase(SessionPhase::LoggedOn);
                }
                let manager = HeartbeatManager::new(
                    HeartbeatConfig::new(self.config.heartbeat_interval),
                    Arc::clone(&self.heartbeat),
                    hb_tx,
                    cancel.child_token(),
                );
                tokio::spawn(manager.run());

                self.reconnect_policy.lock().reset();
                tracing::info!(
                    session = %self.config.name,
                    next_out_seq = self.status.read().next_out_seq,
                    "Logged on"
                );
                Ok(())
            }
            Ok(Ok(LogonOutcome::Rejected(text))) => {
                self.connection_lost(id, &format!("logon rejected: {text}"));
                Err(SessionError::LogonRejected(text))
            }
            Ok(Err(_)) => Err(SessionError::ConnectionLost),
            Err(_) => {
                drop(self.pending_logon.lock().take());
                self.connection_lost(id, "logon timed out");
                Err(SessionError::LogonTimeout(self.config.logon_timeout))
            }
        }
    }

    /// Tear down connection `id` after an unsolicited failure.
    ///
    /// Does nothing if that connection is already gone.
    fn connection_lost(&self, id: u64, reason: &str) {
        let active = {
            let mut guard = self.connection.lock();
            match guard.as_ref() {
                Some(active) if active.id == id => guard.take(),
                _ => None,
            }
        };
        let Some(active) = active else {
            return;
        };

        active.cancel.cancel();
        drop(self.pending_logon.lock().take());
        self.status.write().last_error = Some(reason.to_string());
        self.set_phase(SessionPhase::Disconnected);
        metrics::record_disconnect(&self.config.name);
        tracing::warn!(session = %self.config.name, reason = %reason, "Session connection lost");

        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        if !self.auto_reconnect.load(Ordering::SeqCst) || self.shutdown.is_cancelled() {
            return;
        }
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(me) = self.me.upgrade() else {
            self.reconnecting.store(false, Ordering::SeqCst);
            return;
        };

        tokio::spawn(async move {
            me.reconnect_loop().await;
            me.reconnecting.store(false, Ordering::SeqCst);
            if me.phase() == SessionPhase::Disconnected {
                me.schedule_reconnect();
            }
        });
    }

    async fn reconnect_loop(&self) {
        loop {
            let (delay, attempt) = {
                let mut policy = self.reconnect_policy.lock();
                (policy.next_delay(), policy.attempt_count())
            };
            let Some(delay) = delay else {
                tracing::error!(session = %self.config.name, "Reconnect attempts exhausted");
                return;
            };

            tracing::info!(
                session = %self.config.name,
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting after backoff"
            );
            tokio::select! {
                () = self.shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if !self.auto_reconnect.load(Ordering::SeqCst) {
                return;
            }

            self.status.write().reconnect_attempts += 1;
            metrics::record_reconnect(&self.config.name);
            match self.establish().await {
                Ok(()) => {
                    tracing::info!(session = %self.config.name, attempt, "Reconnected");
                    return;
                }
                Err(e) => {
                    tracing::warn!(session = %self.config.name, attempt, error = %e, "Reconnect failed");
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Receive Task
    // -------------------------------------------------------------------------

    async fn run_connection(
        self: Arc<Self>,
        id: u64,
        mut reader: TransportReader,
        mut hb_rx: mpsc::Receiver<HeartbeatEvent>,
        cancel: CancellationToken,
    ) {
        let reason = loop {
            tokio::select! {
                () = cancel.cancelled() => break None,
                inbound = reader.recv() => match inbound {
                    Ok(Some(msg)) => {
                        if let ControlFlow::Break(reason) = self.process_inbound(msg).await {
                            break Some(reason);
                        }
                    }
                    Ok(None) => break Some("connection closed by venue".to_string()),
                    Err(e) => break Some(format!("read failed: {e}")),
                },
                Some(event) = hb_rx.recv() => {
                    if let ControlFlow::Break(reason) = self.on_heartbeat_event(event).await {
                        break Some(reason);
                    }
                }
            }
        };

        let writer = {
            let mut out = self.outbound.lock().await;
            if out.connection_id == id { out.writer.take() } else { None }
        };
        if let Some(mut writer) = writer {
            writer.shutdown().await;
        }
        if let Some(reason) = reason {
            self.connection_lost(id, &reason);
        }
        tracing::debug!(session = %self.config.name, connection = id, "Receive task finished");
    }

    async fn process_inbound(&self, msg: WireMessage) -> ControlFlow<String> {
        self.heartbeat.record_inbound();
        let msg_type = msg.msg_type();
        metrics::record_message_received(&self.config.name, msg_type.label());
        if let Some(log) = &self.message_log {
            log.record(Direction::Inbound, &msg).await;
        }
        self.track_inbound_seq(&msg, &msg_type);
        tracing::debug!(
            session = %self.config.name,
            msg_type = %msg_type,
            seq = ?msg.seq_num(),
            "Inbound message"
        );

        match self.handler.on_message(msg).await {
            Some(control) => self.on_control(control).await,
            None => ControlFlow::Continue(()),
        }
    }

    fn track_inbound_seq(&self, msg: &WireMessage, msg_type: &MsgType) {
        let Some(seq) = msg.seq_num() else {
            tracing::warn!(session = %self.config.name, msg_type = %msg_type, "Inbound message without MsgSeqNum");
            return;
        };
        let poss_dup = msg.get_flag(tags::POSS_DUP_FLAG);
        let mut status = self.status.write();
        if let Some(last) = status.last_inbound_seq
            && *msg_type != MsgType::Logon
            && !poss_dup
        {
            let expected = last + 1;
            if seq > expected {
                tracing::warn!(
                    session = %self.config.name,
                    expected,
                    received = seq,
                    "Inbound sequence gap"
                );
            } else if seq < expected {
                tracing::warn!(
                    session = %self.config.name,
                    expected,
                    received = seq,
                    "Inbound sequence lower than expected"
                );
            }
        }
        if !poss_dup || status.last_inbound_seq.is_none_or(|last| seq > last) {
            status.last_inbound_seq = Some(seq);
        }
    }

    async fn on_control(&self, control: SessionControl) -> ControlFlow<String> {
        match control {
            SessionControl::Logon { heartbeat_secs } => {
                let pending = self.pending_logon.lock().take();
                match pending {
                    Some(tx) => {
                        let _ = tx.send(LogonOutcome::Accepted { heartbeat_secs });
                    }
                    None => tracing::debug!(session = %self.config.name, "Unsolicited Logon ignored"),
                }
            }
            SessionControl::Heartbeat { test_req_id } => {
                tracing::trace!(session = %self.config.name, test_req_id = ?test_req_id, "Heartbeat");
            }
            SessionControl::TestRequest { test_req_id } => {
                if let Err(e) = self.send_heartbeat(Some(test_req_id)).await {
                    return ControlFlow::Break(format!("test request reply failed: {e}"));
                }
            }
            SessionControl::ResendRequest { begin, end } => {
                if let Err(e) = self.handle_resend_request(begin, end).await {
                    tracing::warn!(session = %self.config.name, begin, end, error = %e, "ResendRequest handling failed");
                }
            }
            SessionControl::SequenceReset { new_seq, gap_fill } => {
                tracing::info!(session = %self.config.name, new_seq, gap_fill, "Inbound SequenceReset");
                self.status.write().last_inbound_seq = Some(new_seq.saturating_sub(1));
            }
            SessionControl::Logout { text } => return self.on_logout(text).await,
            SessionControl::Reject { ref_seq, reason, text } => {
                tracing::warn!(
                    session = %self.config.name,
                    ref_seq = ?ref_seq,
                    reason = ?reason,
                    text = text.as_deref().unwrap_or(""),
                    "Session-level Reject from venue"
                );
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_logout(&self, text: Option<String>) -> ControlFlow<String> {
        let text = text.unwrap_or_default();
        match self.phase() {
            SessionPhase::LoggingOut => {
                self.logout_notify.notify_waiters();
                ControlFlow::Continue(())
            }
            SessionPhase::Connecting => {
                let pending = self.pending_logon.lock().take();
                if let Some(tx) = pending {
                    let _ = tx.send(LogonOutcome::Rejected(text));
                }
                ControlFlow::Continue(())
            }
            SessionPhase::LoggedOn | SessionPhase::Disconnected => {
                tracing::warn!(session = %self.config.name, text = %text, "Venue initiated Logout");
                if let Err(e) = self.send_internal(&WireMessageBuilder::new(MsgType::Logout)).await {
                    tracing::debug!(session = %self.config.name, error = %e, "Logout reply failed");
                }
                ControlFlow::Break(format!("venue logout: {text}"))
            }
        }
    }

    async fn on_heartbeat_event(&self, event: HeartbeatEvent) -> ControlFlow<String> {
        match event {
            HeartbeatEvent::SendHeartbeat => match self.send_heartbeat(None).await {
                Ok(_) => ControlFlow::Continue(()),
                Err(e) => ControlFlow::Break(format!("heartbeat send failed: {e}")),
            },
            HeartbeatEvent::SendTestRequest(test_req_id) => {
                let body = WireMessageBuilder::new(MsgType::TestRequest).field(tags::TEST_REQ_ID, test_req_id);
                match self.send_internal(&body).await {
                    Ok(_) => ControlFlow::Continue(()),
                    Err(e) => ControlFlow::Break(format!("test request send failed: {e}")),
                }
            }
            HeartbeatEvent::Timeout => ControlFlow::Break("heartbeat timeout".to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Send Path
    // -------------------------------------------------------------------------

    /// Send an application message. Returns the MsgSeqNum used.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotLoggedOn` before logon, `Sequence` if the
    /// counter could not be stored (nothing sent), or `Send` if the write
    /// failed (counter restored, connection dropped).
    pub async fn send(&self, body: WireMessageBuilder) -> Result<u64, SessionError> {
        if !self.is_logged_on() {
            return Err(SessionError::NotLoggedOn);
        }
        self.send_internal(&body).await
    }

    /// Send a Heartbeat, echoing `test_req_id` when answering a TestRequest.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`], without the logon check.
    pub async fn send_heartbeat(&self, test_req_id: Option<String>) -> Result<u64, SessionError> {
        let body = WireMessageBuilder::new(MsgType::Heartbeat).field_opt(tags::TEST_REQ_ID, test_req_id);
        self.send_internal(&body).await
    }

    async fn send_internal(&self, body: &WireMessageBuilder) -> Result<u64, SessionError> {
        let mut out = self.outbound.lock().await;
        let seq = out.next_out_seq;
        self.transmit(&mut out, body, seq, false, seq + 1).await
    }

    /// Answer a ResendRequest.
    ///
    /// `begin == 1` restarts outbound numbering at 1. Any other begin gets a
    /// single GapFill stamped `begin` with NewSeqNo `begin + 1`, after which
    /// numbering continues from `begin + 1`.
    async fn handle_resend_request(&self, begin: u64, end: u64) -> Result<(), SessionError> {
        let mut out = self.outbound.lock().await;
        match begin {
            0 => {
                tracing::warn!(session = %self.config.name, "ResendRequest with BeginSeqNo 0 ignored");
                Ok(())
            }
            INITIAL_SEQUENCE => {
                self.reset_outbound_sequence(&mut out).await?;
                tracing::info!(session = %self.config.name, end, "ResendRequest from 1, outbound sequence reset");
                Ok(())
            }
            begin => {
                let new_seq = begin + 1;
                let body = WireMessageBuilder::new(MsgType::SequenceReset)
                    .field(tags::GAP_FILL_FLAG, "Y")
                    .field(tags::NEW_SEQ_NO, new_seq);
                self.transmit(&mut out, &body, begin, true, new_seq).await?;
                metrics::record_gap_fill(&self.config.name);
                tracing::info!(session = %self.config.name, begin, end, new_seq, "GapFill sent");
                Ok(())
            }
        }
    }

    async fn reset_outbound_sequence(&self, out: &mut Outbound) -> Result<(), SessionError> {
        if let Err(e) = self.store.persist(INITIAL_SEQUENCE).await {
            metrics::record_sequence_persist_failure(&self.config.name);
            return Err(e.into());
        }
        out.next_out_seq = INITIAL_SEQUENCE;
        self.status.write().next_out_seq = INITIAL_SEQUENCE;
        Ok(())
    }

    /// Stamp, persist the following sequence number, then write.
    async fn transmit(
        &self,
        out: &mut Outbound,
        body: &WireMessageBuilder,
        seq: u64,
        poss_dup: bool,
        next_seq: u64,
    ) -> Result<u64, SessionError> {
        if !out.writer.as_ref().is_some_and(TransportWriter::is_alive) {
            if self.phase() != SessionPhase::Disconnected {
                out.writer = None;
                self.connection_lost(out.connection_id, "socket not writable");
            }
            return Err(SessionError::NotConnected);
        }

        let msg = body.build(&OutboundHeader {
            sender_comp_id: &self.config.sender_comp_id,
            target_comp_id: &self.config.target_comp_id,
            seq_num: seq,
            sending_time: Utc::now(),
            poss_dup,
        });

        let previous = out.next_out_seq;
        if let Err(e) = self.store.persist(next_seq).await {
            metrics::record_sequence_persist_failure(&self.config.name);
            tracing::error!(session = %self.config.name, seq, error = %e, "Sequence persist failed, message not sent");
            return Err(e.into());
        }
        out.next_out_seq = next_seq;

        let frame = msg.encode();
        let written = match out.writer.as_mut() {
            Some(writer) => writer.send(&frame).await,
            None => Err(SendError::NotConnected),
        };

        if let Err(e) = written {
            out.next_out_seq = previous;
            if let Err(pe) = self.store.persist(previous).await {
                tracing::warn!(session = %self.config.name, error = %pe, "Could not restore sequence after failed write");
            }
            out.writer = None;
            self.status.write().next_out_seq = previous;
            tracing::warn!(session = %self.config.name, seq, error = %e, "Write failed");
            self.connection_lost(out.connection_id, &format!("write failed: {e}"));
            return Err(e.into());
        }

        {
            let mut status = self.status.write();
            status.next_out_seq = next_seq;
            status.messages_sent += 1;
        }
        let msg_type = body.msg_type();
        metrics::record_message_sent(&self.config.name, msg_type.label());
        if let Some(log) = &self.message_log {
            log.record(Direction::Outbound, &msg).await;
        }
        tracing::debug!(session = %self.config.name, msg_type = %msg_type, seq, "Outbound message");
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedRead;

    use crate::infrastructure::fix::codec::{FixFrameCodec, decode};
    use crate::infrastructure::fix::sequence::InMemorySequenceStore;

    fn stamp(builder: WireMessageBuilder) -> WireMessage {
        builder.build(&OutboundHeader {
            sender_comp_id: "VENUE",
            target_comp_id: "CLIENT",
            seq_num: 9,
            sending_time: Utc::now(),
            poss_dup: false,
        })
    }

    #[test]
    fn resend_request_defaults_end_to_infinity() {
        let msg = stamp(WireMessageBuilder::new(MsgType::ResendRequest).field(tags::BEGIN_SEQ_NO, 5));
        assert_eq!(
            SessionControl::from_message(&msg),
            Some(SessionControl::ResendRequest { begin: 5, end: 0 })
        );
    }

    #[test]
    fn test_request_without_id_is_dropped() {
        let msg = stamp(WireMessageBuilder::new(MsgType::TestRequest));
        assert_eq!(SessionControl::from_message(&msg), None);
    }

    #[test]
    fn reject_carries_reference_fields() {
        let msg = stamp(
            WireMessageBuilder::new(MsgType::Reject)
                .field(tags::REF_SEQ_NUM, 14)
                .field(tags::SESSION_REJECT_REASON, 5)
                .field(tags::TEXT, "Value is incorrect"),
        );
        assert_eq!(
            SessionControl::from_message(&msg),
            Some(SessionControl::Reject {
                ref_seq: Some(14),
                reason: Some(5),
                text: Some("Value is incorrect".into()),
            })
        );
    }

    #[test]
    fn application_messages_are_not_session_control() {
        let msg = stamp(WireMessageBuilder::new(MsgType::ExecutionReport));
        assert_eq!(SessionControl::from_message(&msg), None);
    }

    #[test]
    fn sequence_reset_reads_gap_fill_flag() {
        let msg = stamp(
            WireMessageBuilder::new(MsgType::SequenceReset)
                .field(tags::GAP_FILL_FLAG, "Y")
                .field(tags::NEW_SEQ_NO, 30),
        );
        assert_eq!(
            SessionControl::from_message(&msg),
            Some(SessionControl::SequenceReset {
                new_seq: 30,
                gap_fill: true
            })
        );
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::LoggedOn).unwrap(),
            "\"logged_on\""
        );
    }

    struct SessionOnly;

    #[async_trait]
    impl InboundHandler for SessionOnly {
        async fn on_message(&self, msg: WireMessage) -> Option<SessionControl> {
            SessionControl::from_message(&msg)
        }
    }

    type VenueSide = (
        FramedRead<tokio::net::tcp::OwnedReadHalf, FixFrameCodec>,
        tokio::net::tcp::OwnedWriteHalf,
    );

    async fn accept_logon(listener: &TcpListener) -> VenueSide {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = FramedRead::new(read, FixFrameCodec::new());
        let frame = tokio::time::timeout(Duration::from_secs(5), reader.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(decode(&frame).unwrap().msg_type(), MsgType::Logon);

        let ack = WireMessageBuilder::new(MsgType::Logon)
            .field(tags::HEART_BT_INT, 30)
            .build(&OutboundHeader {
                sender_comp_id: "VENUE",
                target_comp_id: "CLIENT",
                seq_num: 1,
                sending_time: Utc::now(),
                poss_dup: false,
            });
        write.write_all(&ack.encode()).await.unwrap();
        (reader, write)
    }

    #[tokio::test]
    async fn unwritable_socket_drops_connection_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = SessionConfig::new(
            "pricing",
            "CLIENT",
            "VENUE",
            TransportConfig::plaintext("127.0.0.1", port),
        );
        config.reconnect = ReconnectConfig::fixed(Duration::from_millis(50));
        config.logon_timeout = Duration::from_secs(2);
        let session = SessionController::new(
            config,
            Arc::new(InMemorySequenceStore::new(1)),
            Arc::new(SessionOnly),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let (result, _first) = tokio::join!(
            session.logon(Credentials::new("trader", "secret")),
            accept_logon(&listener)
        );
        result.unwrap();

        session
            .outbound
            .lock()
            .await
            .writer
            .as_mut()
            .unwrap()
            .shutdown()
            .await;

        let err = session
            .send(WireMessageBuilder::new(MsgType::Heartbeat))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert!(!session.is_logged_on());
        assert_eq!(session.status().last_error.as_deref(), Some("socket not writable"));
        assert_eq!(session.next_out_seq().await, 2);

        let _second = accept_logon(&listener).await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !session.is_logged_on() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.is_logged_on());
        assert_eq!(session.send_heartbeat(None).await.unwrap(), 3);
        session.disconnect().await;
    }
}

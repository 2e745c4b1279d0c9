//! FIX Session Adapters
//!
//! Implements the venue's FIX 4.4 connectivity:
//!
//! - **Codec**: tag=value encoding, checksums, stream framing
//! - **Transport**: TCP/TLS socket halves
//! - **Session**: logon, heartbeats, gap fill, logout, reconnect
//! - **Sequence**: durable outbound MsgSeqNum

pub mod auth;
pub mod codec;
pub mod heartbeat;
pub mod message_log;
pub mod reconnect;
pub mod sequence;
pub mod session;
pub mod tags;
pub mod transport;

pub use auth::{Credentials, LogonOutcome};
pub use codec::{CodecError, FixFrameCodec, GroupEntry, GroupSpec, OutboundHeader, WireMessage, WireMessageBuilder};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use message_log::{Direction, MessageLog};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use sequence::{FileSequenceStore, InMemorySequenceStore, SequenceError, SequenceStore};
pub use session::{
    InboundHandler, SessionConfig, SessionControl, SessionController, SessionError, SessionPhase,
    SessionStatus,
};
pub use tags::MsgType;
pub use transport::{ConnectError, SendError, TlsMode, TlsSettings, Transport, TransportConfig};

//! Logon Credentials
//!
//! Username/password pair carried on Logon (553/554) and the builder for the
//! Logon body itself.

use std::fmt;

use super::codec::{WireMessage, WireMessageBuilder};
use super::tags::{self, MsgType};

/// Venue login. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username (553).
    pub username: String,
    /// Password (554).
    pub password: String,
}

impl Credentials {
    /// Create a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Logon body: EncryptMethod none, HeartBtInt, optional reset and credentials.
#[must_use]
pub fn logon_body(
    credentials: Option<&Credentials>,
    heartbeat_secs: u64,
    reset_seq_num: bool,
) -> WireMessageBuilder {
    let mut builder = WireMessageBuilder::new(MsgType::Logon)
        .field(tags::ENCRYPT_METHOD, 0)
        .field(tags::HEART_BT_INT, heartbeat_secs);
    if reset_seq_num {
        builder = builder.field(tags::RESET_SEQ_NUM_FLAG, "Y");
    }
    if let Some(creds) = credentials {
        builder = builder
            .field(tags::USERNAME, &creds.username)
            .field(tags::PASSWORD, &creds.password);
    }
    builder
}

/// How the venue answered a Logon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogonOutcome {
    /// Logon acknowledged.
    Accepted {
        /// Heartbeat interval echoed by the venue, if any.
        heartbeat_secs: Option<u64>,
    },
    /// Venue answered with Logout; carries its Text (58).
    Rejected(String),
}

/// Classify the first inbound message after sending Logon.
///
/// Returns `None` for anything that is neither Logon nor Logout.
#[must_use]
pub fn logon_outcome(msg: &WireMessage) -> Option<LogonOutcome> {
    match msg.msg_type() {
        MsgType::Logon => Some(LogonOutcome::Accepted {
            heartbeat_secs: msg.get_parsed(tags::HEART_BT_INT),
        }),
        MsgType::Logout => Some(LogonOutcome::Rejected(
            msg.get(tags::TEXT).unwrap_or("logon refused").to_string(),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fix::codec::OutboundHeader;
    use chrono::Utc;

    fn stamp(builder: &WireMessageBuilder) -> WireMessage {
        builder.build(&OutboundHeader {
            sender_comp_id: "C",
            target_comp_id: "V",
            seq_num: 1,
            sending_time: Utc::now(),
            poss_dup: false,
        })
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("desk1", "s3cret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("desk1"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn logon_carries_interval_reset_and_credentials() {
        let creds = Credentials::new("desk1", "s3cret");
        let msg = stamp(&logon_body(Some(&creds), 30, true));

        assert_eq!(msg.msg_type(), MsgType::Logon);
        assert_eq!(msg.get(tags::HEART_BT_INT), Some("30"));
        assert_eq!(msg.get(tags::ENCRYPT_METHOD), Some("0"));
        assert!(msg.get_flag(tags::RESET_SEQ_NUM_FLAG));
        assert_eq!(msg.get(tags::USERNAME), Some("desk1"));
        assert_eq!(msg.get(tags::PASSWORD), Some("s3cret"));
    }

    #[test]
    fn logon_without_reset_omits_flag() {
        let msg = stamp(&logon_body(None, 30, false));
        assert!(!msg.contains(tags::RESET_SEQ_NUM_FLAG));
        assert!(!msg.contains(tags::USERNAME));
    }

    #[test]
    fn logout_reply_is_a_rejection() {
        let reply = stamp(&WireMessageBuilder::new(MsgType::Logout).field(tags::TEXT, "bad password"));
        assert_eq!(
            logon_outcome(&reply),
            Some(LogonOutcome::Rejected("bad password".into()))
        );

        let ack = stamp(&logon_body(None, 15, false));
        assert_eq!(
            logon_outcome(&ack),
            Some(LogonOutcome::Accepted {
                heartbeat_secs: Some(15)
            })
        );
    }
}

//! Raw Message Log
//!
//! Append-only text log of every message sent and received, one per line:
//! `<RFC 3339 timestamp> <IN|OUT> <fields with | delimiters>`.
//! Write failures are logged and never affect the session.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::codec::WireMessage;

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the venue.
    Inbound,
    /// Sent to the venue.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbound => "IN",
            Self::Outbound => "OUT",
        })
    }
}

/// Append-only raw message log.
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl MessageLog {
    /// Open (creating if needed) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened for append.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open the log if a path is configured; failures disable logging.
    pub async fn open_optional(path: Option<&Path>) -> Option<Self> {
        let path = path?;
        match Self::open(path).await {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Message log disabled");
                None
            }
        }
    }

    /// Append one message.
    pub async fn record(&self, direction: Direction, msg: &WireMessage) {
        let line = format!(
            "{} {direction} {}\n",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            msg.to_log_string()
        );
        let mut file = self.file.lock().await;
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), error = %e, "Message log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fix::codec::{OutboundHeader, WireMessageBuilder};
    use crate::infrastructure::fix::tags::MsgType;

    #[tokio::test]
    async fn appends_direction_marked_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("pricing.log");
        let log = MessageLog::open(&path).await.unwrap();

        let msg = WireMessageBuilder::new(MsgType::Heartbeat).build(&OutboundHeader {
            sender_comp_id: "C",
            target_comp_id: "V",
            seq_num: 4,
            sending_time: chrono::Utc::now(),
            poss_dup: false,
        });
        log.record(Direction::Outbound, &msg).await;
        log.record(Direction::Inbound, &msg).await;
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" OUT 8=FIX.4.4|35=0|"));
        assert!(lines[1].contains(" IN 8=FIX.4.4|"));
        assert!(!contents.contains('\x01'));
    }

    #[tokio::test]
    async fn missing_path_disables_logging() {
        assert!(MessageLog::open_optional(None).await.is_none());
    }
}

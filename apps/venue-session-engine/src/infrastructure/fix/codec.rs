//! FIX Wire Codec
//!
//! Stateless encode/decode of tag=value messages.
//!
//! - [`WireMessage`]: decoded message as an ordered list of `(tag, value)`
//!   fields. Framing fields (8, 9, 10) are stripped on decode and recomputed
//!   on encode.
//! - [`WireMessageBuilder`]: mutable construction state for outbound messages.
//! - [`FixFrameCodec`]: splits a socket byte stream into complete frames using
//!   the embedded BodyLength and trailing CheckSum.
//!
//! # Wire Format
//!
//! ```text
//! 8=FIX.4.4<SOH>9=<len><SOH>35=<type><SOH> ... <SOH>10=<sum><SOH>
//! ```
//!
//! BodyLength counts the bytes from the field after `9=` up to and including
//! the SOH before `10=`. CheckSum is the byte sum of everything before `10=`
//! modulo 256, rendered as three digits.

use std::fmt::{Display, Write as _};
use std::str::FromStr;

use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::codec::Decoder;

use super::tags::{self, MsgType, SOH};

/// Upper bound on a single frame body.
const MAX_BODY_LENGTH: usize = 1024 * 1024;

/// Upper bound on the `8=...` field, SOH excluded.
const MAX_BEGIN_STRING_LEN: usize = 16;

/// Length of the `10=NNN<SOH>` trailer.
const TRAILER_LEN: usize = 7;

/// SendingTime format (UTC, millisecond precision).
pub const SENDING_TIME_FORMAT: &str = "%Y%m%d-%H:%M:%S%.3f";

// =============================================================================
// Errors
// =============================================================================

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Socket read failed while framing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A field had no `=` separator.
    #[error("malformed field at offset {offset}")]
    MalformedField {
        /// Byte offset of the field within the frame.
        offset: usize,
    },

    /// A tag was not a positive integer.
    #[error("invalid tag '{0}'")]
    InvalidTag(String),

    /// A field value was not valid UTF-8.
    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(u32),

    /// Required framing field missing or out of place.
    #[error("missing or misplaced framing field {0}")]
    MissingFramingField(u32),

    /// BodyLength did not match the frame.
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch {
        /// Value of tag 9.
        declared: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// CheckSum did not match the frame.
    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch {
        /// Value of tag 10.
        declared: String,
        /// Checksum over the received bytes.
        computed: String,
    },
}

// =============================================================================
// Repeating Groups
// =============================================================================

/// Layout of a repeating group: its NoXXX count tag and member tags.
///
/// The first member is the delimiter that opens every entry.
#[derive(Debug, Clone, Copy)]
pub struct GroupSpec {
    /// NoXXX tag carrying the entry count.
    pub count_tag: u32,
    /// Tags that may appear inside an entry, delimiter first.
    pub members: &'static [u32],
}

/// Market data / quote entries (NoMDEntries).
pub const MD_ENTRIES: GroupSpec = GroupSpec {
    count_tag: tags::NO_MD_ENTRIES,
    members: &[
        tags::MD_ENTRY_TYPE,
        tags::MD_UPDATE_ACTION,
        tags::SYMBOL,
        tags::MD_ENTRY_PX,
        tags::MD_ENTRY_SIZE,
        tags::MD_ENTRY_DATE,
        tags::MD_ENTRY_TIME,
        tags::MD_ENTRY_ORIGINATOR,
        tags::MD_ENTRY_FORWARD_POINTS,
        tags::CURRENCY,
        tags::SETTL_TYPE,
        tags::SETTL_DATE,
        tags::QUOTE_ID,
    ],
};

/// Instruments of a request (NoRelatedSym).
pub const RELATED_SYM: GroupSpec = GroupSpec {
    count_tag: tags::NO_RELATED_SYM,
    members: &[
        tags::SYMBOL,
        tags::SECURITY_TYPE,
        tags::SIDE,
        tags::ORDER_QTY,
        tags::CURRENCY,
        tags::SETTL_TYPE,
        tags::SETTL_DATE,
        tags::FIXING_DATE,
        tags::ORDER_QTY_2,
        tags::SETTL_TYPE_2,
        tags::SETTL_DATE_2,
        tags::FIXING_DATE_2,
    ],
};

/// Party block (NoPartyIDs).
pub const PARTIES: GroupSpec = GroupSpec {
    count_tag: tags::NO_PARTY_IDS,
    members: &[tags::PARTY_ID, tags::PARTY_ID_SOURCE, tags::PARTY_ROLE],
};

/// Requested entry types of a market data request (NoMDEntryTypes).
pub const MD_ENTRY_TYPES: GroupSpec = GroupSpec {
    count_tag: tags::NO_MD_ENTRY_TYPES,
    members: &[tags::MD_ENTRY_TYPE],
};

/// One entry of a repeating group.
#[derive(Debug, Clone, Copy)]
pub struct GroupEntry<'a> {
    fields: &'a [(u32, String)],
}

impl<'a> GroupEntry<'a> {
    /// Value of a member tag within this entry.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&'a str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Member tag parsed as a decimal.
    #[must_use]
    pub fn get_decimal(&self, tag: u32) -> Option<Decimal> {
        self.get(tag).and_then(|v| Decimal::from_str(v).ok())
    }

    /// Fields of this entry in wire order.
    #[must_use]
    pub const fn fields(&self) -> &'a [(u32, String)] {
        self.fields
    }
}

// =============================================================================
// Wire Message
// =============================================================================

/// A decoded (or fully built) FIX message.
///
/// Fields keep wire order. Framing fields 8, 9 and 10 are not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    begin_string: String,
    fields: Vec<(u32, String)>,
}

impl WireMessage {
    /// All non-framing fields, in order.
    #[must_use]
    pub fn fields(&self) -> &[(u32, String)] {
        &self.fields
    }

    /// BeginString the message was framed with.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// First value of `tag`.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.get_indexed(tag, 0)
    }

    /// Value of the `index`-th occurrence of `tag` (0-based).
    #[must_use]
    pub fn get_indexed(&self, tag: u32, index: usize) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(t, _)| *t == tag)
            .nth(index)
            .map(|(_, v)| v.as_str())
    }

    /// First value of `tag`, parsed.
    #[must_use]
    pub fn get_parsed<T: FromStr>(&self, tag: u32) -> Option<T> {
        self.get(tag).and_then(|v| v.parse().ok())
    }

    /// First value of `tag` as a decimal.
    #[must_use]
    pub fn get_decimal(&self, tag: u32) -> Option<Decimal> {
        self.get_parsed(tag)
    }

    /// `Y`/`N` flag; absent means `false`.
    #[must_use]
    pub fn get_flag(&self, tag: u32) -> bool {
        self.get(tag) == Some("Y")
    }

    /// Whether `tag` appears at all.
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.fields.iter().any(|(t, _)| *t == tag)
    }

    /// MsgType (35).
    #[must_use]
    pub fn msg_type(&self) -> MsgType {
        self.get(tags::MSG_TYPE)
            .map_or_else(|| MsgType::Other(String::new()), MsgType::parse)
    }

    /// MsgSeqNum (34).
    #[must_use]
    pub fn seq_num(&self) -> Option<u64> {
        self.get_parsed(tags::MSG_SEQ_NUM)
    }

    /// Entries of a repeating group.
    ///
    /// An entry opens at the delimiter tag and closes at the next delimiter, at
    /// the first non-member tag, or when the declared count is reached.
    #[must_use]
    pub fn group(&self, spec: GroupSpec) -> Vec<GroupEntry<'_>> {
        let Some(start) = self.fields.iter().position(|(t, _)| *t == spec.count_tag) else {
            return Vec::new();
        };
        let declared: usize = self.fields[start].1.parse().unwrap_or(0);
        let Some(&delimiter) = spec.members.first() else {
            return Vec::new();
        };

        let mut entries = Vec::with_capacity(declared);
        let mut entry_start: Option<usize> = None;
        let mut idx = start + 1;

        while idx < self.fields.len() {
            let tag = self.fields[idx].0;
            if tag == delimiter {
                if let Some(s) = entry_start.take() {
                    entries.push(GroupEntry {
                        fields: &self.fields[s..idx],
                    });
                }
                if entries.len() == declared {
                    break;
                }
                entry_start = Some(idx);
            } else if !spec.members.contains(&tag) || entry_start.is_none() {
                break;
            }
            idx += 1;
        }

        if let Some(s) = entry_start
            && entries.len() < declared
        {
            entries.push(GroupEntry {
                fields: &self.fields[s..idx],
            });
        }

        entries
    }

    /// Encode to wire bytes, recomputing BodyLength and CheckSum.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut body = Vec::with_capacity(self.fields.len() * 12);
        for (tag, value) in &self.fields {
            push_field(&mut body, *tag, value);
        }

        let mut out = BytesMut::with_capacity(body.len() + 32);
        push_field_bytes(&mut out, tags::BEGIN_STRING_TAG, &self.begin_string);
        push_field_bytes(&mut out, tags::BODY_LENGTH, &body.len().to_string());
        out.extend_from_slice(&body);
        let sum = checksum(&out);
        push_field_bytes(&mut out, tags::CHECKSUM, &sum);
        out.freeze()
    }

    /// Render with `|` in place of SOH, masking the password field.
    #[must_use]
    pub fn to_log_string(&self) -> String {
        let mut out = String::with_capacity(self.fields.len() * 12);
        let _ = write!(out, "8={}{}", self.begin_string, tags::LOG_DELIMITER);
        for (tag, value) in &self.fields {
            if *tag == tags::PASSWORD {
                let _ = write!(out, "{tag}=****{}", tags::LOG_DELIMITER);
            } else {
                let _ = write!(out, "{tag}={value}{}", tags::LOG_DELIMITER);
            }
        }
        out
    }
}

fn push_field(buf: &mut Vec<u8>, tag: u32, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.push(b'=');
    buf.extend_from_slice(value.as_bytes());
    buf.push(SOH);
}

fn push_field_bytes(buf: &mut BytesMut, tag: u32, value: &str) {
    buf.extend_from_slice(tag.to_string().as_bytes());
    buf.extend_from_slice(b"=");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(&[SOH]);
}

/// Byte sum modulo 256, as three digits.
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    let sum = bytes.iter().fold(0u32, |acc, b| acc + u32::from(*b)) % 256;
    format!("{sum:03}")
}

// =============================================================================
// Builder
// =============================================================================

/// Header fields stamped onto an outbound message by the session.
#[derive(Debug, Clone)]
pub struct OutboundHeader<'a> {
    /// SenderCompID (49).
    pub sender_comp_id: &'a str,
    /// TargetCompID (56).
    pub target_comp_id: &'a str,
    /// MsgSeqNum (34).
    pub seq_num: u64,
    /// SendingTime (52).
    pub sending_time: DateTime<Utc>,
    /// Adds PossDupFlag=Y and OrigSendingTime.
    pub poss_dup: bool,
}

/// Mutable construction state for an outbound message body.
#[derive(Debug, Clone)]
pub struct WireMessageBuilder {
    msg_type: MsgType,
    fields: Vec<(u32, String)>,
}

impl WireMessageBuilder {
    /// Start a message of the given type.
    #[must_use]
    pub const fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, tag: u32, value: impl Display) -> Self {
        self.fields.push((tag, value.to_string()));
        self
    }

    /// Append a field when the value is present.
    #[must_use]
    pub fn field_opt<V: Display>(self, tag: u32, value: Option<V>) -> Self {
        match value {
            Some(v) => self.field(tag, v),
            None => self,
        }
    }

    /// Append a repeating group: the count tag followed by each entry's fields.
    #[must_use]
    pub fn group(mut self, count_tag: u32, entries: Vec<Vec<(u32, String)>>) -> Self {
        self.fields.push((count_tag, entries.len().to_string()));
        for entry in entries {
            self.fields.extend(entry);
        }
        self
    }

    /// Message type being built.
    #[must_use]
    pub const fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Body fields appended so far.
    #[must_use]
    pub fn body(&self) -> &[(u32, String)] {
        &self.fields
    }

    /// Finish the message with the session header.
    #[must_use]
    pub fn build(&self, header: &OutboundHeader<'_>) -> WireMessage {
        let sending_time = header.sending_time.format(SENDING_TIME_FORMAT).to_string();
        let mut fields = Vec::with_capacity(self.fields.len() + 7);
        fields.push((tags::MSG_TYPE, self.msg_type.as_str().to_string()));
        fields.push((tags::SENDER_COMP_ID, header.sender_comp_id.to_string()));
        fields.push((tags::TARGET_COMP_ID, header.target_comp_id.to_string()));
        fields.push((tags::MSG_SEQ_NUM, header.seq_num.to_string()));
        fields.push((tags::SENDING_TIME, sending_time.clone()));
        if header.poss_dup {
            fields.push((tags::POSS_DUP_FLAG, "Y".to_string()));
            fields.push((tags::ORIG_SENDING_TIME, sending_time));
        }
        fields.extend(self.fields.iter().cloned());

        WireMessage {
            begin_string: tags::BEGIN_STRING.to_string(),
            fields,
        }
    }
}

// =============================================================================
// Decode
// =============================================================================

/// Decode one complete frame.
///
/// # Errors
///
/// Returns `CodecError` if the frame is malformed, or if BodyLength or
/// CheckSum do not match the bytes received.
pub fn decode(frame: &[u8]) -> Result<WireMessage, CodecError> {
    let mut raw: Vec<(u32, &[u8], usize)> = Vec::new();
    let mut offset = 0;
    for chunk in frame.split(|b| *b == SOH) {
        if chunk.is_empty() {
            offset += 1;
            continue;
        }
        let eq = chunk
            .iter()
            .position(|b| *b == b'=')
            .ok_or(CodecError::MalformedField { offset })?;
        let tag_str = std::str::from_utf8(&chunk[..eq])
            .map_err(|_| CodecError::InvalidTag(String::from_utf8_lossy(&chunk[..eq]).into()))?;
        let tag: u32 = tag_str
            .parse()
            .ok()
            .filter(|t| *t > 0)
            .ok_or_else(|| CodecError::InvalidTag(tag_str.to_string()))?;
        raw.push((tag, &chunk[eq + 1..], offset));
        offset += chunk.len() + 1;
    }

    let begin = match raw.first() {
        Some((tags::BEGIN_STRING_TAG, value, _)) => value_to_string(tags::BEGIN_STRING_TAG, value)?,
        _ => return Err(CodecError::MissingFramingField(tags::BEGIN_STRING_TAG)),
    };
    let declared_len: usize = match raw.get(1) {
        Some((tags::BODY_LENGTH, value, _)) => value_to_string(tags::BODY_LENGTH, value)?
            .parse()
            .map_err(|_| CodecError::MissingFramingField(tags::BODY_LENGTH))?,
        _ => return Err(CodecError::MissingFramingField(tags::BODY_LENGTH)),
    };
    let (declared_sum, checksum_offset) = match raw.last() {
        Some((tags::CHECKSUM, value, off)) => (value_to_string(tags::CHECKSUM, value)?, *off),
        _ => return Err(CodecError::MissingFramingField(tags::CHECKSUM)),
    };
    if !matches!(raw.get(2), Some((tags::MSG_TYPE, _, _))) {
        return Err(CodecError::MissingFramingField(tags::MSG_TYPE));
    }

    let body_start = raw[2].2;
    let actual_len = checksum_offset.saturating_sub(body_start);
    if actual_len != declared_len {
        return Err(CodecError::BodyLengthMismatch {
            declared: declared_len,
            actual: actual_len,
        });
    }

    let computed = checksum(&frame[..checksum_offset]);
    if computed != declared_sum {
        return Err(CodecError::ChecksumMismatch {
            declared: declared_sum,
            computed,
        });
    }

    let fields = raw[2..raw.len() - 1]
        .iter()
        .map(|(tag, value, _)| value_to_string(*tag, value).map(|v| (*tag, v)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WireMessage {
        begin_string: begin,
        fields,
    })
}

fn value_to_string(tag: u32, value: &[u8]) -> Result<String, CodecError> {
    std::str::from_utf8(value)
        .map(str::to_string)
        .map_err(|_| CodecError::InvalidUtf8(tag))
}

// =============================================================================
// Stream Framing
// =============================================================================

/// Splits a byte stream into complete FIX frames.
///
/// Bytes before the next `8=` are discarded. A frame with an overlong
/// BeginString, or an unreadable or oversized BodyLength, is skipped rather
/// than ending the stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixFrameCodec;

impl FixFrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for FixFrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(start) = find(src, b"8=") else {
                // Keep a trailing '8' that may start the next frame.
                let keep = usize::from(src.last() == Some(&b'8'));
                let discard = src.len() - keep;
                if discard > 0 {
                    tracing::warn!(bytes = discard, "Discarding bytes outside a FIX frame");
                    src.advance(discard);
                }
                return Ok(None);
            };
            if start > 0 {
                tracing::warn!(bytes = start, "Discarding bytes before FIX frame start");
                src.advance(start);
            }

            let begin_end = src.iter().take(MAX_BEGIN_STRING_LEN + 1).position(|b| *b == SOH);
            let Some(begin_end) = begin_end else {
                if src.len() > MAX_BEGIN_STRING_LEN {
                    tracing::warn!("Unterminated BeginString, resynchronising");
                    src.advance(2);
                    continue;
                }
                return Ok(None);
            };
            let rest = &src[begin_end + 1..];
            if rest.len() < 2 {
                return Ok(None);
            }
            if !rest.starts_with(b"9=") {
                tracing::warn!("Frame missing BodyLength, resynchronising");
                src.advance(2);
                continue;
            }
            let Some(len_end) = rest.iter().position(|b| *b == SOH) else {
                if rest.len() > 12 {
                    tracing::warn!("Unterminated BodyLength, resynchronising");
                    src.advance(2);
                    continue;
                }
                return Ok(None);
            };
            let body_len = std::str::from_utf8(&rest[2..len_end])
                .ok()
                .and_then(|s| s.parse::<usize>().ok());
            let Some(body_len) = body_len.filter(|len| *len <= MAX_BODY_LENGTH) else {
                tracing::warn!("Invalid BodyLength, resynchronising");
                src.advance(2);
                continue;
            };

            let header_len = begin_end + 1 + len_end + 1;
            let total = header_len + body_len + TRAILER_LEN;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            return Ok(Some(src.split_to(total).freeze()));
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

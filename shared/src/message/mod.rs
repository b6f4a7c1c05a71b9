//! 推送通道消息类型定义
//!
//! A [`ChangeEvent`] tells subscribers that one row of a watched collection
//! was inserted, updated or deleted. The same type travels in-process (tokio
//! broadcast) and over TCP using the frame codec below:
//!
//! ```text
//! ┌──────┬──────────────┬──────────────┬─────────────────────┐
//! │ kind │   event_id   │ payload len  │ payload (JSON)      │
//! │ 1 B  │    16 B      │  4 B (LE)    │ ChangePayload       │
//! └──────┴──────────────┴──────────────┴─────────────────────┘
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Collection;

pub mod payload;
pub use payload::*;

/// Size of the fixed frame header
pub const FRAME_HEADER_LEN: usize = 1 + 16 + 4;

/// Largest payload accepted from the wire (4 MiB)
pub const MAX_PAYLOAD_LEN: usize = 4 * 1024 * 1024;

/// Frame codec errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid change kind: {0}")]
    InvalidKind(u8),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert = 1,
    Update = 2,
    Delete = 3,
}

impl TryFrom<u8> for ChangeKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChangeKind::Insert),
            2 => Ok(ChangeKind::Update),
            3 => Ok(ChangeKind::Delete),
            other => Err(FrameError::InvalidKind(other)),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// 行变更事件
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub event_id: Uuid,
    pub kind: ChangeKind,
    pub collection: Collection,
    /// Row after the change (None for deletes)
    pub record: Option<Value>,
    /// Row before the change (None for inserts)
    pub old_record: Option<Value>,
    /// Milliseconds since epoch, backend clock
    pub commit_timestamp: i64,
}

impl ChangeEvent {
    pub fn new(
        kind: ChangeKind,
        collection: Collection,
        record: Option<Value>,
        old_record: Option<Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            collection,
            record,
            old_record,
            commit_timestamp: crate::util::now_millis(),
        }
    }

    /// 创建插入事件
    pub fn insert(collection: Collection, record: Value) -> Self {
        Self::new(ChangeKind::Insert, collection, Some(record), None)
    }

    /// 创建更新事件
    pub fn update(collection: Collection, record: Value, old_record: Option<Value>) -> Self {
        Self::new(ChangeKind::Update, collection, Some(record), old_record)
    }

    /// 创建删除事件
    pub fn delete(collection: Collection, old_record: Value) -> Self {
        Self::new(ChangeKind::Delete, collection, None, Some(old_record))
    }

    /// Row that subscription filters are evaluated against
    pub fn row(&self) -> Option<&Value> {
        match self.kind {
            ChangeKind::Delete => self.old_record.as_ref().or(self.record.as_ref()),
            _ => self.record.as_ref().or(self.old_record.as_ref()),
        }
    }

    /// 解析新行为指定类型
    pub fn parse_record<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.record
            .as_ref()
            .map(|record| serde_json::from_value(record.clone()))
    }

    fn payload(&self) -> ChangePayload {
        ChangePayload {
            collection: self.collection,
            record: self.record.clone(),
            old_record: self.old_record.clone(),
            commit_timestamp: self.commit_timestamp,
        }
    }

    /// Encode as one wire frame
    pub fn to_frame(&self) -> Result<Vec<u8>, FrameError> {
        let payload = serde_json::to_vec(&self.payload())?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        let mut data = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        data.push(self.kind as u8);
        data.extend_from_slice(self.event_id.as_bytes());
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);
        Ok(data)
    }

    /// Decode one complete frame
    pub fn from_frame(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: FRAME_HEADER_LEN,
                actual: frame.len(),
            });
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&frame[..FRAME_HEADER_LEN]);
        let header = FrameHeader::parse(&header)?;
        let body = &frame[FRAME_HEADER_LEN..];
        if body.len() != header.payload_len {
            return Err(FrameError::Truncated {
                expected: FRAME_HEADER_LEN + header.payload_len,
                actual: frame.len(),
            });
        }
        header.into_event(body)
    }
}

/// Parsed fixed-size frame header (used by streaming readers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: ChangeKind,
    pub event_id: Uuid,
    pub payload_len: usize,
}

impl FrameHeader {
    pub fn parse(buf: &[u8; FRAME_HEADER_LEN]) -> Result<Self, FrameError> {
        let kind = ChangeKind::try_from(buf[0])?;
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[1..17]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[17..21]);
        let payload_len = u32::from_le_bytes(len) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload_len));
        }
        Ok(Self {
            kind,
            event_id: Uuid::from_bytes(id),
            payload_len,
        })
    }

    pub fn into_event(self, body: &[u8]) -> Result<ChangeEvent, FrameError> {
        let payload: ChangePayload = serde_json::from_slice(body)?;
        Ok(ChangeEvent {
            event_id: self.event_id,
            kind: self.kind,
            collection: payload.collection,
            record: payload.record,
            old_record: payload.old_record,
            commit_timestamp: payload.commit_timestamp,
        })
    }
}

use async_trait::async_trait;
use shared::message::{ChangeEvent, FRAME_HEADER_LEN, FrameHeader};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{Mutex, broadcast};

use crate::message::BusError;

/// Transport abstraction for the change feed
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Next event; `BusError::Closed` once the feed has ended
    async fn read_event(&self) -> Result<ChangeEvent, BusError>;
    async fn close(&self) -> Result<(), BusError>;
}

/// TCP Transport Implementation
#[derive(Debug, Clone)]
pub struct TcpTransport {
    reader: Arc<Mutex<OwnedReadHalf>>,
}

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, BusError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BusError::Connection(format!("{}: {}", addr, e)))?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        // The feed is one-way, the write half is not needed
        let (reader, _writer) = stream.into_split();
        Self {
            reader: Arc::new(Mutex::new(reader)),
        }
    }
}

fn eof_as_closed(e: std::io::Error) -> BusError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        BusError::Closed
    } else {
        BusError::Io(e)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_event(&self) -> Result<ChangeEvent, BusError> {
        let mut reader = self.reader.lock().await;

        // Header: kind (1) + event id (16) + payload length (4)
        let mut header_buf = [0u8; FRAME_HEADER_LEN];
        reader
            .read_exact(&mut header_buf)
            .await
            .map_err(eof_as_closed)?;
        let header = FrameHeader::parse(&header_buf)?;

        // Payload
        let mut payload = vec![0u8; header.payload_len];
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;

        Ok(header.into_event(&payload)?)
    }

    async fn close(&self) -> Result<(), BusError> {
        // Dropping the Arc references will eventually close the stream
        Ok(())
    }
}

/// Memory Transport Implementation (for In-Process communication)
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    rx: Arc<Mutex<broadcast::Receiver<ChangeEvent>>>,
}

impl MemoryTransport {
    /// Subscribe to an in-process change feed
    pub fn new(feed: &broadcast::Sender<ChangeEvent>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(feed.subscribe())),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read_event(&self) -> Result<ChangeEvent, BusError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Watchers re-fetch, so dropped events only delay a refresh
                    tracing::warn!(skipped, "Change feed lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        Ok(())
    }
}

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{tcp::OwnedWriteHalf, TcpStream};
use tokio_util::{
    codec::{BytesCodec, FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, instrument, trace};

use crate::frames::FrameCodec;

use super::{Error, FrameHandler, Transport};

/// A [`Transport`] over a tokio [`TcpStream`].
///
/// A reader task decodes inbound frames and pushes them to the registered [`FrameHandler`].
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    max_frame_size: usize,
    writer: tokio::sync::Mutex<Option<FramedWrite<OwnedWriteHalf, BytesCodec>>>,
    connected: Arc<AtomicBool>,
    reader_cancel: Mutex<Option<CancellationToken>>,
}

impl TcpTransport {
    /// Creates a transport that connects to `addr` (`host:port`) on [`Transport::connect`].
    ///
    /// Inbound frames larger than `max_frame_size` are rejected. Zero means unlimited.
    pub fn new(addr: impl Into<String>, max_frame_size: usize) -> Self {
        Self {
            addr: addr.into(),
            max_frame_size,
            writer: tokio::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            reader_cancel: Mutex::new(None),
        }
    }

    /// The address this transport connects to
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[instrument(skip_all, fields(addr = %self.addr))]
    async fn connect(&self, handler: Weak<dyn FrameHandler>) -> Result<(), Error> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let mut reader = FramedRead::new(read_half, FrameCodec::new(self.max_frame_size));
        let cancel = CancellationToken::new();
        if let Some(previous) = self.reader_cancel.lock().replace(cancel.clone()) {
            previous.cancel();
        }
        *self.writer.lock().await = Some(FramedWrite::new(write_half, BytesCodec::new()));
        self.connected.store(true, Ordering::Release);
        debug!("connected");

        let connected = self.connected.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = reader.next() => {
                        let handler = match handler.upgrade() {
                            Some(handler) => handler,
                            None => break,
                        };
                        match next {
                            Some(Ok(frame)) => handler.handle_frame(frame).await,
                            Some(Err(err)) => {
                                connected.store(false, Ordering::Release);
                                handler.handle_transport_error(err.into()).await;
                                break;
                            }
                            None => {
                                connected.store(false, Ordering::Release);
                                handler.handle_transport_error(Error::ClosedByPeer).await;
                                break;
                            }
                        }
                    }
                }
            }
            trace!("reader stopped");
        });
        Ok(())
    }

    async fn send(&self, bytes: Bytes) -> Result<(), Error> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        if let Err(err) = writer.send(bytes).await {
            self.connected.store(false, Ordering::Release);
            return Err(err.into());
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(cancel) = self.reader_cancel.lock().take() {
            cancel.cancel();
        }
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = SinkExt::<Bytes>::close(&mut writer).await;
        }
        self.connected.store(false, Ordering::Release);
        debug!(addr = %self.addr, "disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

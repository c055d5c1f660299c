//! Implements an asynchronous heartbeat

use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use tokio::{task::JoinHandle, time::Instant};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, trace, warn};

use crate::{frames::Frame, transport::Transport};

pin_project! {
    /// A wrapper over an `Option<IntervalStream>` which will never tick ready if the underlying
    /// `Interval` is `None`
    #[derive(Debug)]
    pub struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>
    }
}

impl HeartBeat {
    /// A [`HeartBeat`] that will never yield `Poll::Ready(_)` with `StreamExt::next()`
    pub fn never() -> Self {
        Self { interval: None }
    }

    /// A [`HeartBeat`] that first ticks one `period` from now, then once every `period`
    pub fn new(period: Duration) -> Self {
        let start = Instant::now() + period;
        let interval = Some(IntervalStream::new(tokio::time::interval_at(start, period)));
        Self { interval }
    }
}

impl Stream for HeartBeat {
    type Item = Instant;

    fn poll_next(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.interval.as_pin_mut() {
            Some(stream) => stream.poll_next(cx),
            None => Poll::Pending,
        }
    }
}

/// Emits heartbeat frames while running
pub trait HeartbeatSender: Send + Sync {
    /// Starts emitting one heartbeat frame per `interval`, replacing any running schedule
    fn start(&self, interval: Duration);

    /// Stops emitting heartbeats. Idempotent.
    fn stop(&self);

    /// Whether heartbeats are being emitted. `false` until first started.
    fn is_running(&self) -> bool;
}

/// A [`HeartbeatSender`] that runs a tokio task driven by [`HeartBeat`] and writes heartbeat
/// frames to the transport
pub struct IntervalHeartbeatSender {
    transport: Arc<dyn Transport>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for IntervalHeartbeatSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalHeartbeatSender")
            .field("running", &self.is_running())
            .finish()
    }
}

impl IntervalHeartbeatSender {
    /// Creates a stopped sender writing to `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            task: Mutex::new(None),
        }
    }
}

impl HeartbeatSender for IntervalHeartbeatSender {
    fn start(&self, interval: Duration) {
        let transport = self.transport.clone();
        let frame: Bytes = match Frame::heartbeat().to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(?err, "cannot encode heartbeat frame");
                return;
            }
        };
        let task = tokio::spawn(async move {
            let mut heartbeat = HeartBeat::new(interval);
            while heartbeat.next().await.is_some() {
                trace!("heartbeat");
                if let Err(err) = transport.send(frame.clone()).await {
                    debug!(?err, "heartbeat stopped");
                    break;
                }
            }
        });
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for IntervalHeartbeatSender {
    fn drop(&mut self) {
        self.stop();
    }
}

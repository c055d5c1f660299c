//! Implements the channel, a virtual connection multiplexed over one connection

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll},
    time::Duration,
};

use amqp091_types::{
    constants::REPLY_SUCCESS,
    methods::{ChannelClose, ChannelOpen, Method},
    MethodKind,
};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::{
    connection::Shared,
    queue::{Command, Completion},
};

pub(crate) mod allocator;
mod error;

pub use error::Error;

/// Reply text sent with a client initiated close
pub(crate) const GOODBYE: &str = "Goodbye";

/// State of a [`Channel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// `channel.open` has been queued but `channel.open-ok` has not arrived yet
    Opening,
    /// The channel accepts commands
    Open,
    /// A close was requested, the `channel.close` exchange has not finished
    Closing,
    /// Terminal
    Closed,
}

/// A channel of a [`crate::Connection`].
///
/// Cloning a channel yields another handle to the same channel. Every operation is routed
/// through the connection's command queue.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    id: u16,
    state: Mutex<ChannelState>,
    replies_tx: Mutex<Option<mpsc::UnboundedSender<Method>>>,
    replies_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Method>>,
    awaited: Mutex<Option<MethodKind>>,
    close_reason: Mutex<Option<(u16, String)>>,
    flow_active: AtomicBool,
    /// Gave up on a reply, inbound methods are discarded until `channel.close-ok`
    draining: AtomicBool,
    connection: Weak<Shared>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(id: u16, connection: Weak<Shared>) -> Self {
        Self::with_state(id, ChannelState::Opening, connection)
    }

    /// Channel 0, used for connection-level methods. It is open from the start.
    pub(crate) fn control(connection: Weak<Shared>) -> Self {
        Self::with_state(0, ChannelState::Open, connection)
    }

    fn with_state(id: u16, state: ChannelState, connection: Weak<Shared>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ChannelInner {
                id,
                state: Mutex::new(state),
                replies_tx: Mutex::new(Some(tx)),
                replies_rx: tokio::sync::Mutex::new(rx),
                awaited: Mutex::new(None),
                close_reason: Mutex::new(None),
                flow_active: AtomicBool::new(true),
                draining: AtomicBool::new(false),
                connection,
            }),
        }
    }

    /// Channel number
    pub fn id(&self) -> u16 {
        self.inner.id
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        *self.inner.state.lock()
    }

    /// Whether the channel accepts commands
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// The reply a [`Channel::blocking_wait_on`] call is waiting for right now
    pub fn awaited_method(&self) -> Option<MethodKind> {
        *self.inner.awaited.lock()
    }

    /// Whether the broker allows content to flow, see `channel.flow`
    pub fn flow_active(&self) -> bool {
        self.inner.flow_active.load(Ordering::Acquire)
    }

    /// Reply code and text of a broker initiated close
    pub fn close_reason(&self) -> Option<(u16, String)> {
        self.inner.close_reason.lock().clone()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    fn shared(&self) -> Result<Arc<Shared>, Error> {
        self.inner.connection.upgrade().ok_or(Error::ConnectionDropped)
    }

    /// Moves from any of `from` to `to`. Returns whether the transition happened.
    pub(crate) fn transition(&self, from: &[ChannelState], to: ChannelState) -> bool {
        let mut state = self.inner.state.lock();
        if from.contains(&*state) {
            trace!(channel = self.inner.id, from = ?*state, ?to, "state");
            *state = to;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_flow(&self, active: bool) {
        self.inner.flow_active.store(active, Ordering::Release);
    }

    /// Hands an inbound method to whoever waits on this channel
    pub(crate) fn deliver(&self, method: Method) {
        match self.inner.replies_tx.lock().as_ref() {
            Some(tx) => {
                let _ = tx.send(method);
            }
            None => trace!(channel = self.inner.id, kind = %method.kind(), "dropped reply on closed channel"),
        }
    }

    /// Closes without the close exchange. Pending and future waits fail.
    pub(crate) fn force_close(&self, reason: Option<(u16, String)>) {
        *self.inner.state.lock() = ChannelState::Closed;
        if reason.is_some() {
            *self.inner.close_reason.lock() = reason;
        }
        self.inner.replies_tx.lock().take();
    }

    fn closed_error(&self) -> Error {
        if let Some((reply_code, reply_text)) = self.close_reason() {
            return Error::ClosedByServer {
                reply_code,
                reply_text,
            };
        }
        match self.inner.connection.upgrade() {
            Some(_) => Error::Closed,
            None => Error::ConnectionDropped,
        }
    }

    /// Waits for the next inbound method, which must be `expected`
    pub(crate) async fn wait_for(
        &self,
        expected: MethodKind,
        timeout: Option<Duration>,
    ) -> Result<Method, Error> {
        let mut rx = self.inner.replies_rx.lock().await;
        let next = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx.recv())
                .await
                .map_err(|_| Error::ReplyTimeout(expected))?,
            None => rx.recv().await,
        };
        match next {
            Some(method) if method.kind() == expected => Ok(method),
            Some(method) => Err(Error::UnexpectedMethod {
                expected,
                found: method.kind(),
            }),
            None => Err(self.closed_error()),
        }
    }

    /// Records `kind` as the awaited reply, then waits for it within the reply timeout. The
    /// record is cleared once the wait resolves.
    pub async fn blocking_wait_on(&self, kind: MethodKind) -> Result<Method, Error> {
        let timeout = self.shared()?.config.reply_timeout;
        *self.inner.awaited.lock() = Some(kind);
        let result = self.wait_for(kind, Some(timeout)).await;
        *self.inner.awaited.lock() = None;
        result
    }

    /// Waits for the reply to a method sent on this channel.
    ///
    /// A reply that does not arrive in time makes the channel give up on it. A reply of another
    /// kind fails the whole connection.
    async fn await_reply(&self, kind: MethodKind) -> Result<Method, Error> {
        let result = self.blocking_wait_on(kind).await;
        match &result {
            Err(Error::ReplyTimeout(_)) => self.abandon(kind).await,
            Err(Error::UnexpectedMethod { expected, found }) => {
                if let Ok(shared) = self.shared() {
                    let reason = format!(
                        "{} on channel {} while waiting for {}",
                        found,
                        self.id(),
                        expected
                    );
                    shared.protocol_violation(reason).await;
                }
            }
            _ => {}
        }
        result
    }

    /// Stops waiting for a reply that did not arrive in time.
    ///
    /// The channel keeps its number and discards inbound methods until the broker confirms the
    /// close, so a late reply never reaches a later command.
    async fn abandon(&self, awaited: MethodKind) {
        warn!(channel = self.id(), %awaited, "no reply in time, closing channel");
        self.inner.draining.store(true, Ordering::Release);
        *self.inner.state.lock() = ChannelState::Closing;
        self.inner.replies_tx.lock().take();

        if awaited == MethodKind::ChannelCloseOk {
            return;
        }
        if let Ok(shared) = self.shared() {
            if let Err(err) = shared.send_method(self.id(), goodbye()).await {
                debug!(channel = self.id(), ?err, "failed to send channel.close");
            }
        }
    }

    /// Sends `channel.open` and waits for `channel.open-ok`
    pub(crate) async fn open_and_wait(&self) {
        let result: Result<Method, Error> = async {
            let shared = self.shared()?;
            shared.send_method(self.id(), ChannelOpen::default()).await?;
            self.await_reply(MethodKind::ChannelOpenOk).await
        }
        .await;

        match result {
            Ok(_) => {
                if self.transition(&[ChannelState::Opening], ChannelState::Open) {
                    debug!(channel = self.id(), "opened");
                }
            }
            // The number is released once the broker confirms the close
            Err(Error::ReplyTimeout(_)) => {}
            Err(err) => {
                warn!(channel = self.id(), ?err, "failed to open channel");
                self.force_close(None);
                if let Ok(shared) = self.shared() {
                    shared.allocator.release(self.id());
                }
            }
        }
    }

    /// Sends `channel.close`, waits for `channel.close-ok`, then releases the channel number
    #[instrument(skip_all, fields(channel = self.id()))]
    pub(crate) async fn close_and_wait(&self) {
        if self.is_draining() {
            trace!("close already sent");
            return;
        }
        let result: Result<Method, Error> = async {
            let shared = self.shared()?;
            shared.send_method(self.id(), goodbye()).await?;
            self.await_reply(MethodKind::ChannelCloseOk).await
        }
        .await;
        match result {
            Ok(_) => {}
            Err(Error::ReplyTimeout(_)) => return,
            Err(err) => warn!(?err, "channel close did not complete"),
        }

        self.force_close(None);
        if let Ok(shared) = self.shared() {
            shared.allocator.release(self.id());
        }
        debug!("closed");
    }

    fn begin_close(&self) -> bool {
        self.transition(
            &[ChannelState::Opening, ChannelState::Open],
            ChannelState::Closing,
        )
    }

    fn close_command(&self) -> Command {
        let channel = self.clone();
        Command::new("channel.close", async move { channel.close_and_wait().await })
    }

    /// Queues the close exchange and returns immediately. Closing a closing or closed channel
    /// does nothing.
    pub fn close(&self) {
        if !self.begin_close() {
            return;
        }
        match self.shared() {
            Ok(shared) => shared.queue.enqueue(self.close_command()),
            Err(_) => self.force_close(None),
        }
    }

    /// Queues the close exchange. The returned [`Completion`] resolves once the broker
    /// confirmed the close or the wait for it failed.
    pub fn blocking_close(&self) -> Completion {
        if !self.begin_close() {
            return Completion::ready();
        }
        match self.shared() {
            Ok(shared) => shared.queue.blocking_enqueue(self.close_command()),
            Err(_) => {
                self.force_close(None);
                Completion::ready()
            }
        }
    }

    async fn execute(&self, method: Method) -> Result<Option<Method>, Error> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        let shared = self.shared()?;
        let expected = method.expected_reply();
        shared.send_method(self.id(), method).await?;
        match expected {
            Some(kind) => self.await_reply(kind).await.map(Some),
            None => Ok(None),
        }
    }

    /// Queues `method` and resolves to the broker's synchronous reply, or `None` for methods
    /// without one (including those sent with `no_wait`).
    ///
    /// A channel whose reply does not arrive within the reply timeout is closed.
    pub fn command(&self, method: impl Into<Method>) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let method = method.into();
        match self.state() {
            ChannelState::Opening | ChannelState::Open => {}
            ChannelState::Closing | ChannelState::Closed => {
                let _ = tx.send(Err(Error::Closed));
                return PendingReply { rx };
            }
        }
        let shared = match self.shared() {
            Ok(shared) => shared,
            Err(err) => {
                let _ = tx.send(Err(err));
                return PendingReply { rx };
            }
        };

        let channel = self.clone();
        shared.queue.enqueue(Command::new("channel.command", async move {
            let result = channel.execute(method).await;
            if let Err(err) = &result {
                debug!(channel = channel.id(), ?err, "command failed");
            }
            let _ = tx.send(result);
        }));
        PendingReply { rx }
    }
}

fn goodbye() -> ChannelClose {
    ChannelClose {
        reply_code: REPLY_SUCCESS,
        reply_text: GOODBYE.into(),
        class_id: 0,
        method_id: 0,
    }
}

pin_project! {
    /// Resolves to the broker's reply to a queued command
    #[derive(Debug)]
    pub struct PendingReply {
        #[pin]
        rx: oneshot::Receiver<Result<Option<Method>, Error>>,
    }
}

impl Future for PendingReply {
    type Output = Result<Option<Method>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The command was dropped with the queue
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionDropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

//! Implements the AMQP 0-9-1 connection

use std::{
    sync::{
        atomic::{AtomicU16, AtomicU32, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use amqp091_types::{
    constants::REPLY_SUCCESS,
    methods::{ConnectionClose, ConnectionOpen, ConnectionStartOk, ConnectionTuneOk, Method},
    FieldTable, MethodKind,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, instrument, trace, warn};
use url::Url;

use crate::{
    auth::CredentialProvider,
    channel::{self, allocator::ChannelAllocator, Channel, ChannelState, GOODBYE},
    frames::Frame,
    queue::{Command, CommandQueue, Completion},
    transport::{self, protocol_header::ProtocolHeader, Transport},
};

mod builder;
pub use builder::*;

pub mod delegate;
pub(crate) mod engine;

mod error;
pub mod heartbeat;
pub use error::*;

use self::{
    delegate::{ConnectionDelegate, ConnectionEvent},
    heartbeat::HeartbeatSender,
};

/// Default channel-max proposed to the broker
pub const DEFAULT_CHANNEL_MAX: u16 = 2047;

/// Default frame-max proposed to the broker
pub const DEFAULT_FRAME_MAX: u32 = 128 * 1024;

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT: u16 = 60;

/// Smallest frame-max a peer may negotiate, also the frame size used before tuning
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Default broker port
pub const DEFAULT_PORT: u16 = 5672;

/// Default message locale
pub const DEFAULT_LOCALE: &str = "en_US";

/// Default bound on the whole handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on waiting for a synchronous reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// State of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, [`Connection::start`] has not been called
    Start,
    /// The handshake is queued or running
    Handshaking,
    /// The handshake completed
    Open,
    /// The close sequence is queued or running
    Closing,
    /// Terminal. Closed by either peer or after losing the transport.
    Closed,
    /// Terminal. The handshake failed or timed out.
    Failed,
}

impl ConnectionState {
    /// Whether the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

/// Settings fixed at construction
#[derive(Clone)]
pub(crate) struct Config {
    pub vhost: String,
    pub credentials: Arc<dyn CredentialProvider>,
    pub heartbeat: u16,
    pub channel_max: u16,
    pub frame_max: u32,
    pub handshake_timeout: Duration,
    pub reply_timeout: Duration,
    pub client_properties: FieldTable,
    pub locale: String,
}

/// Values agreed on during tuning
#[derive(Debug)]
struct Tuning {
    channel_max: AtomicU16,
    frame_max: AtomicU32,
    heartbeat: AtomicU16,
}

/// State shared by a connection, its channels and the commands they queue
pub(crate) struct Shared {
    pub(crate) config: Config,
    state: watch::Sender<ConnectionState>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) allocator: ChannelAllocator,
    control: Channel,
    pub(crate) queue: Arc<dyn CommandQueue>,
    pub(crate) heartbeat: Arc<dyn HeartbeatSender>,
    delegate: Arc<dyn ConnectionDelegate>,
    tuning: Tuning,
    failure: Mutex<Option<String>>,
}

/// Negotiates one tuning value. Zero on either side defers to the other side.
pub(crate) fn negotiate<T>(server: T, client: T) -> T
where
    T: Ord + Default + Copy,
{
    let zero = T::default();
    if server == zero {
        client
    } else if client == zero {
        server
    } else {
        server.min(client)
    }
}

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state");
        }
    }

    /// Moves from `from` to `to`. Returns whether the transition happened.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(from = ?from, to = ?to, "connection state");
        }
        changed
    }

    pub(crate) fn frame_max(&self) -> u32 {
        self.tuning.frame_max.load(Ordering::Acquire)
    }

    #[instrument(name = "SEND", skip_all)]
    pub(crate) async fn send_frame(&self, frame: Frame) -> Result<(), transport::Error> {
        trace!(channel = frame.channel, frame = ?frame.body);
        let bytes = frame.to_bytes()?;
        self.transport.send(bytes).await
    }

    pub(crate) async fn send_method(
        &self,
        channel: u16,
        method: impl Into<Method>,
    ) -> Result<(), transport::Error> {
        self.send_frame(Frame::method(channel, method)).await
    }

    /// Closes every channel without the close exchange and releases user channel numbers
    pub(crate) fn force_close_channels(&self, reason: Option<(u16, String)>) {
        for channel in self.allocator.all_channels() {
            channel.force_close(reason.clone());
            self.allocator.release(channel.id());
        }
    }

    /// Tears the connection down without the close exchange
    pub(crate) async fn teardown(&self, reason: Option<(u16, String)>, event: ConnectionEvent) {
        self.heartbeat.stop();
        self.transport.disconnect().await;
        self.force_close_channels(reason);
        self.set_state(ConnectionState::Closed);
        self.delegate.on_event(event);
    }

    /// Tears the connection down and reports `reason` as a protocol violation
    pub(crate) async fn protocol_violation(&self, reason: String) {
        if self.state().is_terminal() {
            debug!(%reason, "protocol violation after close");
            return;
        }
        error!(%reason, "protocol violation");
        self.teardown(None, ConnectionEvent::ProtocolViolation(reason))
            .await;
    }

    fn client_properties(&self) -> FieldTable {
        let capabilities = FieldTable::new()
            .with("publisher_confirms", true)
            .with("exchange_exchange_bindings", true)
            .with("basic.nack", true)
            .with("consumer_cancel_notify", true)
            .with("connection.blocked", true)
            .with("authentication_failure_close", true);
        let mut properties = FieldTable::new()
            .with("product", env!("CARGO_PKG_NAME"))
            .with("version", env!("CARGO_PKG_VERSION"))
            .with("platform", "Rust")
            .with("information", env!("CARGO_PKG_DESCRIPTION"))
            .with("capabilities", capabilities);
        for (key, value) in self.config.client_properties.iter() {
            properties.insert(key.clone(), value.clone());
        }
        properties
    }

    async fn handshake(self: &Arc<Self>) -> Result<(), Error> {
        let handler: Weak<Shared> = Arc::downgrade(self);
        self.transport.connect(handler).await?;
        self.send_protocol_header().await?;

        let start = match self.control.wait_for(MethodKind::ConnectionStart, None).await? {
            Method::ConnectionStart(start) => start,
            other => return Err(unexpected(MethodKind::ConnectionStart, &other)),
        };
        debug!(
            version_major = start.version_major,
            version_minor = start.version_minor,
            mechanisms = %start.mechanisms,
            "connection.start"
        );

        let credentials = &self.config.credentials;
        let mechanism = credentials.mechanism();
        if !start.mechanisms.split_whitespace().any(|m| m == mechanism) {
            return Err(Error::MechanismNotSupported {
                mechanism: mechanism.to_string(),
                offered: start.mechanisms,
            });
        }
        let mut offered = start.locales.split_whitespace();
        let locale = match offered.clone().find(|l| *l == self.config.locale) {
            Some(locale) => locale,
            None => offered.next().unwrap_or(self.config.locale.as_str()),
        };
        let start_ok = ConnectionStartOk {
            client_properties: self.client_properties(),
            mechanism: mechanism.into(),
            response: credentials.response(),
            locale: locale.into(),
        };
        self.send_method(0, start_ok).await?;

        let tune = match self.control.wait_for(MethodKind::ConnectionTune, None).await? {
            Method::ConnectionTune(tune) => tune,
            other => return Err(unexpected(MethodKind::ConnectionTune, &other)),
        };
        let channel_max = negotiate(tune.channel_max, self.config.channel_max);
        let frame_max = match negotiate(tune.frame_max, self.config.frame_max) {
            0 => 0,
            n => n.max(FRAME_MIN_SIZE),
        };
        let heartbeat = negotiate(tune.heartbeat, self.config.heartbeat);
        debug!(channel_max, frame_max, heartbeat, "tuned");
        self.send_method(
            0,
            ConnectionTuneOk {
                channel_max,
                frame_max,
                heartbeat,
            },
        )
        .await?;
        self.tuning.channel_max.store(channel_max, Ordering::Release);
        self.tuning.frame_max.store(frame_max, Ordering::Release);
        self.tuning.heartbeat.store(heartbeat, Ordering::Release);
        self.allocator.set_channel_max(channel_max);

        let open = ConnectionOpen {
            virtual_host: self.config.vhost.as_str().into(),
            ..Default::default()
        };
        self.send_method(0, open).await?;
        self.control
            .wait_for(MethodKind::ConnectionOpenOk, None)
            .await?;

        if heartbeat > 0 {
            self.heartbeat.start(Duration::from_secs(heartbeat as u64));
        }
        Ok(())
    }

    async fn send_protocol_header(&self) -> Result<(), transport::Error> {
        trace!(header = ?ProtocolHeader::amqp(), "SEND");
        self.transport.send(ProtocolHeader::amqp().into()).await
    }

    async fn run_handshake(self: Arc<Self>) {
        let result = match tokio::time::timeout(self.config.handshake_timeout, self.handshake()).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::HandshakeTimeout),
        };

        match result {
            Ok(()) => {
                if self.transition(ConnectionState::Handshaking, ConnectionState::Open) {
                    debug!("connection open");
                }
            }
            Err(err) => {
                error!(?err, "handshake failed");
                let message = err.to_string();
                *self.failure.lock() = Some(message.clone());
                self.heartbeat.stop();
                self.transport.disconnect().await;
                self.force_close_channels(None);
                self.set_state(ConnectionState::Failed);
                self.delegate.on_event(ConnectionEvent::HandshakeFailed(message));
            }
        }
    }

    /// Starts the close sequence. Returns `false` if it already started or the connection is
    /// terminal.
    fn begin_close(&self) -> bool {
        let mut begin = false;
        self.state.send_if_modified(|state| match state {
            ConnectionState::Start | ConnectionState::Handshaking | ConnectionState::Open => {
                *state = ConnectionState::Closing;
                begin = true;
                true
            }
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed => false,
        });
        if begin {
            debug!("closing");
        }
        begin
    }

    async fn close_user_channels(&self) {
        for channel in self.allocator.all_channels() {
            if channel.id() == 0 {
                continue;
            }
            if channel.transition(
                &[ChannelState::Opening, ChannelState::Open],
                ChannelState::Closing,
            ) {
                channel.close_and_wait().await;
            }
        }
    }

    /// The close sequence, one command per step
    fn close_steps(self: &Arc<Self>) -> [Command; 5] {
        let shared = self.clone();
        let close_channels = Command::new("close channels", async move {
            shared.close_user_channels().await
        });

        let shared = self.clone();
        let send_close = Command::new("connection.close", async move {
            let close = ConnectionClose {
                reply_code: REPLY_SUCCESS,
                reply_text: GOODBYE.into(),
                class_id: 0,
                method_id: 0,
            };
            if let Err(err) = shared.send_method(0, close).await {
                warn!(?err, "failed to send connection.close");
            }
        });

        let shared = self.clone();
        let await_close_ok = Command::new("await connection.close-ok", async move {
            if let Err(err) = shared
                .control
                .blocking_wait_on(MethodKind::ConnectionCloseOk)
                .await
            {
                warn!(?err, "connection.close-ok not received");
            }
        });

        let shared = self.clone();
        let stop_heartbeat = Command::new("stop heartbeat", async move {
            shared.heartbeat.stop();
        });

        let shared = self.clone();
        let disconnect = Command::new("disconnect", async move {
            shared.transport.disconnect().await;
            shared.force_close_channels(None);
            shared.transition(ConnectionState::Closing, ConnectionState::Closed);
        });

        [
            close_channels,
            send_close,
            await_close_ok,
            stop_heartbeat,
            disconnect,
        ]
    }
}

fn unexpected(expected: MethodKind, found: &Method) -> Error {
    Error::Channel(channel::Error::UnexpectedMethod {
        expected,
        found: found.kind(),
    })
}

/// A connection to a broker.
///
/// Cloning yields another handle to the same connection. Operations are queued on the
/// connection's [`CommandQueue`] and run one at a time in submission order.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("vhost", &self.shared.config.vhost)
            .finish()
    }
}

impl Connection {
    /// Creates a [`Builder`] for [`Connection`]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Opens a connection with the default settings, see [`Builder::open`]
    pub async fn open(url: impl TryInto<Url, Error = url::ParseError>) -> Result<Self, OpenError> {
        Builder::new().open(url).await
    }

    pub(crate) fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        queue: Arc<dyn CommandQueue>,
        heartbeat: Arc<dyn HeartbeatSender>,
        delegate: Arc<dyn ConnectionDelegate>,
    ) -> Self {
        let channel_max = config.channel_max;
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let control = Channel::control(weak.clone());
            Shared {
                allocator: ChannelAllocator::new(control.clone(), channel_max),
                control,
                config,
                state: watch::Sender::new(ConnectionState::Start),
                transport,
                queue,
                heartbeat,
                delegate,
                tuning: Tuning {
                    channel_max: AtomicU16::new(channel_max),
                    frame_max: AtomicU32::new(FRAME_MIN_SIZE),
                    heartbeat: AtomicU16::new(0),
                },
                failure: Mutex::new(None),
            }
        });
        Self { shared }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the handshake completed and the close sequence has not started
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Whether the transport is connected
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Negotiated channel-max
    pub fn channel_max(&self) -> u16 {
        self.shared.tuning.channel_max.load(Ordering::Acquire)
    }

    /// Negotiated frame-max
    pub fn frame_max(&self) -> u32 {
        self.shared.frame_max()
    }

    /// Negotiated heartbeat interval in seconds
    pub fn heartbeat(&self) -> u16 {
        self.shared.tuning.heartbeat.load(Ordering::Acquire)
    }

    /// Channel 0, which carries connection-level methods
    pub fn control_channel(&self) -> Channel {
        self.shared.control.clone()
    }

    /// All live channels in allocation order, channel 0 first
    pub fn channels(&self) -> Vec<Channel> {
        self.shared.allocator.all_channels()
    }

    /// Queues the handshake: connect the transport, send the protocol header, then exchange
    /// start, tune and open with the broker. The whole handshake is bounded by the handshake
    /// timeout.
    pub fn start(&self) -> Result<(), Error> {
        if !self
            .shared
            .transition(ConnectionState::Start, ConnectionState::Handshaking)
        {
            return Err(Error::IllegalState(self.state()));
        }
        let shared = self.shared.clone();
        self.shared
            .queue
            .enqueue(Command::new("handshake", shared.run_handshake()));
        Ok(())
    }

    /// Waits until the handshake finished
    pub async fn wait_until_open(&self) -> Result<(), Error> {
        let mut rx = self.shared.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Handshaking => {}
                ConnectionState::Failed => {
                    let reason = self.shared.failure.lock().clone().unwrap_or_default();
                    return Err(Error::HandshakeFailed(reason));
                }
                other => return Err(Error::IllegalState(other)),
            }
            if rx.changed().await.is_err() {
                return Err(Error::IllegalState(self.state()));
            }
        }
    }

    /// Allocates the lowest free channel number and queues `channel.open`.
    ///
    /// Commands issued on the returned channel run after it opened.
    pub fn create_channel(&self) -> Result<Channel, Error> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(Error::IllegalState(state));
        }
        let weak = Arc::downgrade(&self.shared);
        let channel = self
            .shared
            .allocator
            .allocate(|id| Channel::new(id, weak))
            .ok_or(Error::ChannelMaxReached)?;
        debug!(channel = channel.id(), "allocated");

        let opening = channel.clone();
        self.shared.queue.enqueue(Command::new("channel.open", async move {
            opening.open_and_wait().await
        }));
        Ok(channel)
    }

    /// Queues the close sequence and returns immediately.
    ///
    /// The sequence is five commands: close every user channel, send `connection.close`, wait
    /// for `connection.close-ok`, stop the heartbeat, disconnect the transport. Closing a
    /// closing or closed connection does nothing.
    pub fn close(&self) {
        if !self.shared.begin_close() {
            return;
        }
        for step in self.shared.close_steps() {
            self.shared.queue.enqueue(step);
        }
    }

    /// Queues the same sequence as [`Connection::close`] with every step as a blocking command.
    /// The returned [`Completion`] resolves once the transport is disconnected.
    pub fn blocking_close(&self) -> Completion {
        if !self.shared.begin_close() {
            return Completion::ready();
        }
        let mut last = Completion::ready();
        for step in self.shared.close_steps() {
            last = self.shared.queue.blocking_enqueue(step);
        }
        last
    }
}

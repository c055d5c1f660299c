#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use amqp091_client::{
    connection::{delegate::ConnectionEvent, heartbeat::HeartbeatSender},
    frames::{Frame, FrameBody, FrameCodec},
    queue::{Command, CommandQueue, Completion},
    transport::{Error, FrameHandler, Transport},
    Builder, Connection,
};
use amqp091_client::types::methods::{
    ChannelCloseOk, ChannelOpenOk, ConnectionCloseOk, ConnectionOpenOk, ConnectionStart,
    ConnectionTune, ExchangeDeclareOk, Method, QueueBindOk, QueueDeclareOk,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

/// A scripted broker that answers synchronously from within `send`
pub struct FakeBroker {
    handler: Mutex<Option<Weak<dyn FrameHandler>>>,
    sent: Mutex<Vec<Frame>>,
    header_received: AtomicBool,
    connected: AtomicBool,
    silent: AtomicBool,
    mechanisms: Mutex<String>,
    disconnects: AtomicUsize,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self {
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            header_received: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            mechanisms: Mutex::new(String::from("PLAIN AMQPLAIN")),
            disconnects: AtomicUsize::new(0),
        }
    }
}

impl FakeBroker {
    /// Stops answering, frames are still recorded
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    pub fn set_mechanisms(&self, mechanisms: &str) {
        *self.mechanisms.lock() = mechanisms.to_string();
    }

    pub fn header_received(&self) -> bool {
        self.header_received.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Every frame sent by the client so far
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    /// Methods sent by the client on `channel`
    pub fn sent_methods(&self, channel: u16) -> Vec<Method> {
        self.sent
            .lock()
            .iter()
            .filter(|frame| frame.channel == channel)
            .filter_map(|frame| match &frame.body {
                FrameBody::Method(method) => Some(method.clone()),
                _ => None,
            })
            .collect()
    }

    /// Channels the client sent `method` on
    pub fn channels_sent(&self, kind: amqp091_client::types::MethodKind) -> Vec<u16> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| match &frame.body {
                FrameBody::Method(method) if method.kind() == kind => Some(frame.channel),
                _ => None,
            })
            .collect()
    }

    /// Pushes a method to the client as if the broker sent it
    pub async fn server_sends(&self, channel: u16, method: impl Into<Method>) {
        self.deliver(vec![Frame::method(channel, method)]).await;
    }

    /// Reports a transport failure to the client
    pub async fn fail(&self, error: Error) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handler) = self.handler() {
            handler.handle_transport_error(error).await;
        }
    }

    fn handler(&self) -> Option<Arc<dyn FrameHandler>> {
        self.handler.lock().as_ref().and_then(Weak::upgrade)
    }

    async fn deliver(&self, frames: Vec<Frame>) {
        // The lock must not be held while the client handles a frame
        let handler = match self.handler() {
            Some(handler) => handler,
            None => return,
        };
        for frame in frames {
            handler.handle_frame(frame).await;
        }
    }

    fn reply_to(&self, frame: &Frame) -> Option<Frame> {
        let method = match &frame.body {
            FrameBody::Method(method) => method,
            _ => return None,
        };
        let channel = frame.channel;
        let reply: Method = match method {
            Method::ConnectionStartOk(_) => ConnectionTune {
                channel_max: 2047,
                frame_max: 131072,
                heartbeat: 60,
            }
            .into(),
            Method::ConnectionOpen(_) => ConnectionOpenOk::default().into(),
            Method::ConnectionClose(_) => ConnectionCloseOk {}.into(),
            Method::ChannelOpen(_) => ChannelOpenOk::default().into(),
            Method::ChannelClose(_) => ChannelCloseOk {}.into(),
            Method::ExchangeDeclare(declare) if !declare.no_wait => ExchangeDeclareOk {}.into(),
            Method::QueueBind(bind) if !bind.no_wait => QueueBindOk {}.into(),
            Method::QueueDeclare(declare) if !declare.no_wait => {
                let queue = if declare.queue.is_empty() {
                    "amq.gen-1".into()
                } else {
                    declare.queue.clone()
                };
                QueueDeclareOk {
                    queue,
                    message_count: 0,
                    consumer_count: 0,
                }
                .into()
            }
            _ => return None,
        };
        Some(Frame::method(channel, reply))
    }

    fn start_method(&self) -> Frame {
        let start = ConnectionStart {
            version_major: 0,
            version_minor: 9,
            mechanisms: self.mechanisms.lock().clone(),
            locales: String::from("en_US"),
            ..Default::default()
        };
        Frame::method(0, start)
    }
}

#[async_trait]
impl Transport for FakeBroker {
    async fn connect(&self, handler: Weak<dyn FrameHandler>) -> Result<(), Error> {
        *self.handler.lock() = Some(handler);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, bytes: Bytes) -> Result<(), Error> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let mut replies = Vec::new();
        if bytes.len() == 8 && &bytes[..4] == b"AMQP" {
            self.header_received.store(true, Ordering::SeqCst);
            replies.push(self.start_method());
        } else {
            let mut codec = FrameCodec::new(0);
            let mut src = BytesMut::from(&bytes[..]);
            while let Some(frame) = codec.decode(&mut src)? {
                replies.extend(self.reply_to(&frame));
                self.sent.lock().push(frame);
            }
        }

        if !self.silent.load(Ordering::SeqCst) {
            self.deliver(replies).await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct QueueState {
    items: usize,
    blocking_items: usize,
    pending: VecDeque<Command>,
}

/// A command queue that only runs commands when stepped
#[derive(Default)]
pub struct FakeSerialQueue {
    state: Mutex<QueueState>,
}

impl FakeSerialQueue {
    /// Commands submitted with `enqueue`
    pub fn items(&self) -> usize {
        self.state.lock().items
    }

    /// Commands submitted with `blocking_enqueue`
    pub fn blocking_items(&self) -> usize {
        self.state.lock().blocking_items
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.state.lock().pending.iter().map(Command::label).collect()
    }

    /// Runs the oldest pending command, returning its label
    pub async fn step(&self) -> Option<&'static str> {
        let command = self.state.lock().pending.pop_front()?;
        let label = command.label();
        command.run().await;
        Some(label)
    }

    /// Runs commands until none is pending, including those queued while running
    pub async fn run_all(&self) -> usize {
        let mut count = 0;
        while self.step().await.is_some() {
            count += 1;
        }
        count
    }
}

impl CommandQueue for FakeSerialQueue {
    fn enqueue(&self, command: Command) {
        let mut state = self.state.lock();
        state.items += 1;
        state.pending.push_back(command);
    }

    fn blocking_enqueue(&self, command: Command) -> Completion {
        let (command, completion) = command.with_completion();
        let mut state = self.state.lock();
        state.blocking_items += 1;
        state.pending.push_back(command);
        completion
    }
}

/// Records calls instead of sending heartbeats
#[derive(Default)]
pub struct HeartbeatSpy {
    starts: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
    interval: Mutex<Option<Duration>>,
}

impl HeartbeatSpy {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Option<Duration> {
        *self.interval.lock()
    }
}

impl HeartbeatSender for HeartbeatSpy {
    fn start(&self, interval: Duration) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        *self.interval.lock() = Some(interval);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A connection wired to test doubles
pub struct Harness {
    pub connection: Connection,
    pub broker: Arc<FakeBroker>,
    pub queue: Arc<FakeSerialQueue>,
    pub heartbeat: Arc<HeartbeatSpy>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_builder(Connection::builder())
    }

    pub fn with_builder(builder: Builder) -> Self {
        let broker = Arc::new(FakeBroker::default());
        let queue = Arc::new(FakeSerialQueue::default());
        let heartbeat = Arc::new(HeartbeatSpy::default());
        let (tx, events) = mpsc::unbounded_channel();
        let connection = builder
            .command_queue(queue.clone())
            .heartbeat_sender(heartbeat.clone())
            .delegate(tx)
            .build(broker.clone());
        Self {
            connection,
            broker,
            queue,
            heartbeat,
            events,
        }
    }

    /// Starts the connection and runs the handshake
    pub async fn open(&self) {
        self.connection.start().unwrap();
        assert_eq!(self.queue.step().await, Some("handshake"));
        assert!(self.connection.is_open());
    }

    /// Takes every event reported so far
    pub fn drain_events(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

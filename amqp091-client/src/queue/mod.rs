//! Serial execution of connection and channel operations
//!
//! Every protocol operation is wrapped in a [`Command`] and handed to a [`CommandQueue`].
//! Commands run one at a time in submission order, and each runs to completion before the
//! next one starts. A blocking command additionally hands a [`Completion`] back to the caller.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

mod serial;

pub use serial::SerialQueue;

/// The command was dropped before it ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Command was cancelled before it ran")]
pub struct Cancelled;

/// A unit of deferred work
pub struct Command {
    label: &'static str,
    work: BoxFuture<'static, ()>,
    done: Option<oneshot::Sender<()>>,
}

impl Command {
    /// Creates a new command. `label` only shows up in logs.
    pub fn new<F>(label: &'static str, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            label,
            work: Box::pin(work),
            done: None,
        }
    }

    /// Label of the command
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Attaches a [`Completion`] that resolves once the command ran
    pub fn with_completion(mut self) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        self.done = Some(tx);
        (self, Completion::new(rx))
    }

    /// Runs the command to completion
    pub async fn run(self) {
        let Self { label, work, done } = self;
        tracing::trace!(command = label, "run");
        work.await;
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("label", &self.label)
            .field("blocking", &self.done.is_some())
            .finish()
    }
}

pin_project! {
    /// Resolves once a blocking command finished running
    #[derive(Debug)]
    pub struct Completion {
        #[pin]
        rx: oneshot::Receiver<()>,
    }
}

impl Completion {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx }
    }

    /// A completion that is already resolved
    pub fn ready() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self::new(rx)
    }

    /// Blocks the current thread until the command ran.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context, use `.await` there.
    pub fn wait(self) -> Result<(), Cancelled> {
        self.rx.blocking_recv().map_err(|_| Cancelled)
    }
}

impl Future for Completion {
    type Output = Result<(), Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        this.rx.poll(cx).map(|result| result.map_err(|_| Cancelled))
    }
}

/// Executes commands strictly in submission order
pub trait CommandQueue: Send + Sync {
    /// Appends a command that the caller does not wait for
    fn enqueue(&self, command: Command);

    /// Appends a command whose completion gates the next command. The returned
    /// [`Completion`] resolves once it ran.
    fn blocking_enqueue(&self, command: Command) -> Completion;
}

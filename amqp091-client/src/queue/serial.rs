use tokio::{sync::mpsc, task::JoinHandle};

use super::{Command, CommandQueue, Completion};

/// A [`CommandQueue`] drained by a dedicated tokio task.
///
/// Ordinary and blocking commands share one FIFO, and the worker awaits each command before
/// receiving the next one. Dropping the queue aborts the worker. Commands that have not
/// started are dropped and their [`Completion`]s resolve to [`super::Cancelled`].
#[derive(Debug)]
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl SerialQueue {
    /// Spawns the worker on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                command.run().await;
            }
        });
        Self { tx, worker }
    }

    fn push(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.tx.send(command) {
            tracing::warn!(command = command.label(), "queue worker stopped, command dropped");
        }
    }
}

impl CommandQueue for SerialQueue {
    fn enqueue(&self, command: Command) {
        self.push(command)
    }

    fn blocking_enqueue(&self, command: Command) -> Completion {
        let (command, completion) = command.with_completion();
        self.push(command);
        completion
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;

    use super::SerialQueue;
    use crate::queue::{Cancelled, Command, CommandQueue};

    #[tokio::test]
    async fn commands_run_in_submission_order() {
        let queue = SerialQueue::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue.enqueue(Command::new("slow", async move {
                tokio::time::sleep(Duration::from_millis(10 * (3 - i))).await;
                log.lock().push(i);
            }));
        }
        let log2 = log.clone();
        let completion = queue.blocking_enqueue(Command::new("blocking", async move {
            log2.lock().push(99);
        }));
        completion.await.unwrap();

        assert_eq!(*log.lock(), vec![0, 1, 2, 99]);
    }

    #[tokio::test]
    async fn blocking_command_finishes_before_next_starts() {
        let queue = SerialQueue::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        let first = queue.blocking_enqueue(Command::new("first", async move {
            l.lock().push("first start");
            tokio::time::sleep(Duration::from_millis(20)).await;
            l.lock().push("first end");
        }));
        let l = log.clone();
        let second = queue.blocking_enqueue(Command::new("second", async move {
            l.lock().push("second");
        }));

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*log.lock(), vec!["first start", "first end", "second"]);
    }

    #[tokio::test]
    async fn dropping_the_queue_cancels_pending_commands() {
        let queue = SerialQueue::spawn();
        queue.enqueue(Command::new("forever", std::future::pending()));
        let completion = queue.blocking_enqueue(Command::new("never runs", async {}));
        drop(queue);
        assert_eq!(completion.await, Err(Cancelled));
    }

    #[test]
    fn wait_blocks_outside_of_the_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let queue = runtime.block_on(async { SerialQueue::spawn() });
        let completion = queue.blocking_enqueue(Command::new("noop", async {}));

        let handle = std::thread::spawn(move || completion.wait());
        runtime.block_on(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert_eq!(handle.join().unwrap(), Ok(()));
    }
}

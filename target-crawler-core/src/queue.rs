//! Bounded hand-off between the producer task and the dispatcher.
//!
//! The queue has exactly one writer ([`TargetSink`]) and one reader
//! ([`TargetQueue`]). Closing happens by dropping the sink, which the run
//! coordinator does once `produce` has returned.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ProduceError;
use crate::target::Target;

/// Creates a queue holding at most `capacity` targets (at least one).
pub fn bounded(capacity: usize, cancel: CancellationToken) -> (TargetSink, TargetQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        TargetSink {
            tx,
            cancel: cancel.clone(),
        },
        TargetQueue { rx, cancel },
    )
}

/// Writing half, owned by the producer task.
#[derive(Debug)]
pub struct TargetSink {
    tx: mpsc::Sender<Target>,
    cancel: CancellationToken,
}

impl TargetSink {
    /// Waits for room in the queue, then enqueues `target`.
    pub async fn push(&self, target: Target) -> Result<(), ProduceError> {
        trace!(identifier = %target.identifier, "queueing target");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProduceError::Cancelled),
            sent = self.tx.send(target) => sent.map_err(|_| ProduceError::QueueClosed),
        }
    }

    /// Signals the reader that no more targets will arrive.
    pub fn close(self) {
        drop(self);
    }
}

/// Reading half, drained by the dispatcher.
#[derive(Debug)]
pub struct TargetQueue {
    rx: mpsc::Receiver<Target>,
    cancel: CancellationToken,
}

impl TargetQueue {
    /// Next target in FIFO order, or `None` once the queue is closed and
    /// drained or the run was cancelled.
    pub async fn recv(&mut self) -> Option<Target> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            target = self.rx.recv() => target,
        }
    }

    /// Stops accepting new targets; pending pushes fail with `QueueClosed`.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_in_fifo_order_then_ends_after_close() {
        let (sink, mut queue) = bounded(4, CancellationToken::new());
        sink.push(Target::new("a")).await.unwrap();
        sink.push(Target::new("b")).await.unwrap();
        sink.close();

        assert_eq!(queue.recv().await.map(|t| t.identifier), Some("a".into()));
        assert_eq!(queue.recv().await.map(|t| t.identifier), Some("b".into()));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn push_fails_once_reader_closed() {
        let (sink, mut queue) = bounded(1, CancellationToken::new());
        queue.close();
        assert_eq!(sink.push(Target::new("a")).await, Err(ProduceError::QueueClosed));
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_full_queue() {
        let cancel = CancellationToken::new();
        let (sink, _queue) = bounded(1, cancel.clone());
        sink.push(Target::new("a")).await.unwrap();

        let blocked = tokio::spawn(async move { sink.push(Target::new("b")).await });
        cancel.cancel();
        assert_eq!(blocked.await.unwrap(), Err(ProduceError::Cancelled));
    }
}

//! Streamed collection reads.
//!
//! A blocking task walks a RocksDB iterator and feeds decoded records into a
//! bounded channel; the consumer pulls one record at a time. Each pull suspends
//! until the producer delivers the next record or closes the channel at the end
//! of the collection. Dropping the cursor stops the producer at its next send.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::StorageError;

/// Lazy, finite, forward-only sequence of records from one collection.
///
/// Not restartable: once exhausted it keeps returning `None`.
pub struct RecordCursor<T> {
    rx: mpsc::Receiver<Result<T, StorageError>>,
    delivered: usize,
}

impl<T> RecordCursor<T> {
    pub(crate) fn new(rx: mpsc::Receiver<Result<T, StorageError>>) -> Self {
        Self { rx, delivered: 0 }
    }

    /// Wait for the next record, or `None` at end of collection.
    pub async fn next(&mut self) -> Option<Result<T, StorageError>> {
        let item = self.rx.recv().await;
        if item.is_some() {
            self.delivered += 1;
        }
        item
    }

    /// Records handed out so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

impl<T> Stream for RecordCursor<T> {
    type Item = Result<T, StorageError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &poll {
            this.delivered += 1;
        }
        poll
    }
}

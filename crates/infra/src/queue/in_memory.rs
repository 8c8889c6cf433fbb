use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{JobQueue, QueueError, Receipt, ReceivedMessage};
use crate::jobs::JobDescriptor;

#[derive(Debug)]
struct Entry {
    descriptor: JobDescriptor,
    visible_at: Instant,
    /// Receipt of the current delivery, if any.
    receipt: Option<Receipt>,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    /// Keyed by enqueue sequence for FIFO delivery.
    entries: BTreeMap<u64, Entry>,
}

/// In-process queue with visibility timeouts and long polling.
///
/// Uses tokio's clock, so `tokio::time::pause` drives visibility expiry in
/// tests.
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    notify: Notify,
}

fn poison_err<T>(_: PoisonError<T>) -> QueueError {
    QueueError::Unavailable("queue lock poisoned".to_string())
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total deliveries of messages still queued for `job_id`.
    #[cfg(test)]
    pub(crate) fn deliveries(&self, job_id: agentflow_core::JobId) -> u32 {
        self.state
            .lock()
            .map(|s| {
                s.entries
                    .values()
                    .filter(|e| e.descriptor.job_id == job_id)
                    .map(|e| e.deliveries)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Claim up to `max` visible entries; otherwise report when the next
    /// hidden one becomes visible.
    fn try_claim(
        &self,
        max: usize,
        visibility_timeout: Duration,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>), QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().map_err(poison_err)?;
        let mut out = Vec::new();
        let mut next_visible: Option<Instant> = None;

        for (seq, entry) in state.entries.iter_mut() {
            if out.len() >= max {
                break;
            }
            if entry.visible_at > now {
                next_visible = Some(next_visible.map_or(entry.visible_at, |t| t.min(entry.visible_at)));
                continue;
            }
            entry.deliveries += 1;
            entry.visible_at = now + visibility_timeout;
            let receipt = Receipt::new(format!("{seq}-{}", entry.deliveries));
            entry.receipt = Some(receipt.clone());
            out.push(ReceivedMessage {
                descriptor: entry.descriptor.clone(),
                receipt,
            });
        }
        Ok((out, next_visible))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().map_err(poison_err)?;
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.insert(
                seq,
                Entry {
                    descriptor: descriptor.clone(),
                    visible_at: Instant::now(),
                    receipt: None,
                    deliveries: 0,
                },
            );
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive_batch(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + wait_time;

        loop {
            // Register interest before checking so an enqueue between the
            // check and the wait is not missed.
            let notified = self.notify.notified();

            let (batch, next_visible) = self.try_claim(max_messages, visibility_timeout)?;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }

            let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, receipt: &Receipt) -> Result<(), QueueError> {
        let mut state = self.state.lock().map_err(poison_err)?;
        let seq = state
            .entries
            .iter()
            .find(|(_, e)| e.receipt.as_ref() == Some(receipt))
            .map(|(seq, _)| *seq)
            .ok_or_else(|| QueueError::InvalidReceipt(receipt.clone()))?;
        state.entries.remove(&seq);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.state.lock().map(|_| ()).map_err(poison_err)
    }

    async fn approximate_depth(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().map_err(poison_err)?.entries.len())
    }
}

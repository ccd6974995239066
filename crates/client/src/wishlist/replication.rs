//! Wishlist replication queue.
//!
//! Local wishlist changes are authoritative for the user; the server copy is
//! brought in line by a single worker task that processes jobs in the order
//! they were queued. Transient failures (network, 5xx, 429) are retried with
//! exponential backoff and jitter. Each job yields a [`ReplicationTicket`]
//! that resolves when the job finishes for good.

use std::time::Duration;

use basket_core::{Identity, ProductId};
use rand::Rng;
use reqwest::Method;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::gateway::{ApiRequest, Gateway, expect_success};

/// Errors reported for a replication job.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The server refused the change, or it kept failing.
    #[error("Replicating {product_id} failed after {attempts} attempt(s): {source}")]
    Api {
        product_id: ProductId,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    /// The worker stopped before the job finished.
    #[error("Replication worker is not running")]
    WorkerGone,
}

/// Which way a product moves on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationOp {
    Add,
    Remove,
}

impl ReplicationOp {
    fn method(self) -> Method {
        match self {
            Self::Add => Method::POST,
            Self::Remove => Method::DELETE,
        }
    }
}

/// One product change to replicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationJob {
    pub op: ReplicationOp,
    pub identity: Identity,
    pub product_id: ProductId,
}

impl ReplicationJob {
    /// Add `product_id` to `identity`'s remote wishlist.
    #[must_use]
    pub const fn add(identity: Identity, product_id: ProductId) -> Self {
        Self {
            op: ReplicationOp::Add,
            identity,
            product_id,
        }
    }

    /// Remove `product_id` from `identity`'s remote wishlist.
    #[must_use]
    pub const fn remove(identity: Identity, product_id: ProductId) -> Self {
        Self {
            op: ReplicationOp::Remove,
            identity,
            product_id,
        }
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::new(
            self.op.method(),
            ["wishlist", self.identity.path_segment()],
        )
        .json(json!({ "productId": self.product_id }))
    }
}

/// Retry policy for replication jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationPolicy {
    /// Attempts per job, including the first. At least one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for ReplicationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl ReplicationPolicy {
    /// Delay after failed attempt number `attempt` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let spread = u64::try_from(self.base_delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = rand::rng().random_range(0..=spread);
        self.backoff(attempt)
            .saturating_add(Duration::from_millis(jitter))
    }
}

// =============================================================================
// Tickets
// =============================================================================

/// Completion handle for one job.
#[derive(Debug)]
pub struct ReplicationTicket {
    product_id: ProductId,
    op: ReplicationOp,
    done: oneshot::Receiver<Result<(), ReplicationError>>,
}

impl ReplicationTicket {
    /// Product this ticket is for.
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Direction of the change.
    #[must_use]
    pub const fn op(&self) -> ReplicationOp {
        self.op
    }

    /// Wait for the job to finish.
    ///
    /// # Errors
    ///
    /// Returns the job's final error, or `ReplicationError::WorkerGone` if the
    /// worker stopped first.
    pub async fn wait(self) -> Result<(), ReplicationError> {
        self.done
            .await
            .unwrap_or(Err(ReplicationError::WorkerGone))
    }
}

/// Completion handles for a group of jobs.
#[derive(Debug, Default)]
pub struct ReplicationBatch {
    tickets: Vec<ReplicationTicket>,
}

impl ReplicationBatch {
    /// Number of jobs in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Returns `true` if the batch holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Wait for every job. Failures do not undo successes.
    pub async fn wait(self) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for ticket in self.tickets {
            let product_id = ticket.product_id.clone();
            match ticket.wait().await {
                Ok(()) => outcome.succeeded.push(product_id),
                Err(e) => outcome.failed.push((product_id, e)),
            }
        }
        outcome
    }
}

/// Final result of a [`ReplicationBatch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<ProductId>,
    pub failed: Vec<(ProductId, ReplicationError)>,
}

impl BatchOutcome {
    /// Returns `true` if every job succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Queue
// =============================================================================

struct Envelope {
    job: ReplicationJob,
    done: oneshot::Sender<Result<(), ReplicationError>>,
}

/// Handle to the replication worker.
#[derive(Clone)]
pub struct ReplicationQueue {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl ReplicationQueue {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// The worker exits when every queue handle has been dropped.
    #[must_use]
    pub fn spawn(gateway: Gateway, policy: ReplicationPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(gateway, policy, receiver));
        Self { sender }
    }

    /// Queue one job.
    pub fn enqueue(&self, job: ReplicationJob) -> ReplicationTicket {
        let (done, receiver) = oneshot::channel();
        let ticket = ReplicationTicket {
            product_id: job.product_id.clone(),
            op: job.op,
            done: receiver,
        };
        if self.sender.send(Envelope { job, done }).is_err() {
            // Dropping the envelope resolves the ticket with WorkerGone.
            warn!(product_id = %ticket.product_id, "Replication worker has stopped");
        }
        ticket
    }

    /// Queue several jobs, in order.
    pub fn enqueue_all(&self, jobs: impl IntoIterator<Item = ReplicationJob>) -> ReplicationBatch {
        ReplicationBatch {
            tickets: jobs.into_iter().map(|job| self.enqueue(job)).collect(),
        }
    }
}

async fn run_worker(
    gateway: Gateway,
    policy: ReplicationPolicy,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(Envelope { job, done }) = receiver.recv().await {
        let result = replicate(&gateway, policy, &job).await;
        // The caller may have dropped its ticket.
        let _ = done.send(result);
    }
    debug!("Replication worker stopped");
}

async fn replicate(
    gateway: &Gateway,
    policy: ReplicationPolicy,
    job: &ReplicationJob,
) -> Result<(), ReplicationError> {
    let request = job.request();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match gateway.send_as(&job.identity, &request).await {
            Ok(response) => expect_success(response).await.map(|_| ()),
            Err(e) => Err(ApiError::from(e)),
        };

        match result {
            Ok(()) => {
                debug!(product_id = %job.product_id, op = ?job.op, attempt, "Replicated");
                return Ok(());
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff_with_jitter(attempt);
                warn!(
                    product_id = %job.product_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Replication failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(product_id = %job.product_id, op = ?job.op, attempt, error = %e, "Replication failed");
                return Err(ReplicationError::Api {
                    product_id: job.product_id.clone(),
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = ReplicationPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_half_base() {
        let policy = ReplicationPolicy::default();
        for attempt in 1..=3 {
            let delay = policy.backoff_with_jitter(attempt);
            assert!(delay >= policy.backoff(attempt));
            assert!(delay <= policy.backoff(attempt) + policy.base_delay / 2);
        }
    }

    #[test]
    fn test_job_request_shape() {
        let job = ReplicationJob::remove(
            Identity::User(basket_core::UserId::new("9")),
            ProductId::new("p1"),
        );
        let request = job.request();
        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(request.path(), "wishlist/9");
    }

    #[tokio::test]
    async fn test_ticket_reports_worker_gone() {
        let (sender, receiver) = mpsc::unbounded_channel::<Envelope>();
        drop(receiver);
        let queue = ReplicationQueue { sender };

        let ticket = queue.enqueue(ReplicationJob::add(
            Identity::Guest,
            ProductId::new("p1"),
        ));
        assert!(matches!(
            ticket.wait().await,
            Err(ReplicationError::WorkerGone)
        ));
    }
}

//! Transport abstraction for talking to the remote API.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use lexis_sync_protocol::{PullPage, PullQuery, SyncRecord, SyncStream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Transport for sync operations.
///
/// Implementations map remote failures onto the engine's taxonomy:
/// unreachable network is [`SyncError::NoConnectivity`], a non-2xx answer
/// is [`SyncError::Api`] and an undecodable body is [`SyncError::Parse`].
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Creates or replaces one record on the server, keyed by its uid.
    async fn push_record(&self, stream: SyncStream, record: &SyncRecord) -> SyncResult<()>;

    /// Fetches the page of changes following `query`.
    async fn pull_page(&self, stream: SyncStream, query: &PullQuery) -> SyncResult<PullPage>;
}

/// A scripted reply of [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply<T> {
    /// Succeed with a value.
    Ok(T),
    /// Fail with an HTTP status.
    Status(u16),
    /// Fail as if the network were down.
    Offline,
    /// Fail as if the body could not be decoded.
    Malformed,
}

impl<T> MockReply<T> {
    fn into_result(self) -> SyncResult<T> {
        match self {
            MockReply::Ok(value) => Ok(value),
            MockReply::Status(status) => Err(SyncError::Api {
                status,
                body: format!("mock status {status}"),
            }),
            MockReply::Offline => Err(SyncError::NoConnectivity),
            MockReply::Malformed => Err(SyncError::Parse("mock malformed body".into())),
        }
    }
}

/// A mock transport for testing.
///
/// Replies are consumed from per-operation queues. When a queue is empty,
/// pushes fall back to [`MockTransport::set_push_fallback`] (success by
/// default) and pulls return an empty final page.
#[derive(Debug)]
pub struct MockTransport {
    push_replies: Mutex<VecDeque<MockReply<()>>>,
    push_fallback: Mutex<MockReply<()>>,
    pull_replies: Mutex<VecDeque<MockReply<PullPage>>>,
    pushed: Mutex<Vec<SyncRecord>>,
    queries: Mutex<Vec<PullQuery>>,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    latency: Mutex<Duration>,
}

impl MockTransport {
    /// Creates a transport that accepts every push and has nothing to pull.
    pub fn new() -> Self {
        Self {
            push_replies: Mutex::new(VecDeque::new()),
            push_fallback: Mutex::new(MockReply::Ok(())),
            pull_replies: Mutex::new(VecDeque::new()),
            pushed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            push_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Queues replies for the next push calls.
    pub fn queue_push(&self, replies: impl IntoIterator<Item = MockReply<()>>) {
        self.push_replies.lock().extend(replies);
    }

    /// Sets the reply used once the push queue is empty.
    pub fn set_push_fallback(&self, reply: MockReply<()>) {
        *self.push_fallback.lock() = reply;
    }

    /// Queues replies for the next pull calls.
    pub fn queue_pull(&self, replies: impl IntoIterator<Item = MockReply<PullPage>>) {
        self.pull_replies.lock().extend(replies);
    }

    /// Makes every call take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Returns the records accepted so far, in order.
    pub fn pushed(&self) -> Vec<SyncRecord> {
        self.pushed.lock().clone()
    }

    /// Returns the queries received so far, in order.
    pub fn queries(&self) -> Vec<PullQuery> {
        self.queries.lock().clone()
    }

    /// Returns the number of push calls, successful or not.
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of pull calls, successful or not.
    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push_record(&self, _stream: SyncStream, record: &SyncRecord) -> SyncResult<()> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let reply = self
            .push_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.push_fallback.lock().clone());
        reply.into_result()?;
        self.pushed.lock().push(record.clone());
        Ok(())
    }

    async fn pull_page(&self, _stream: SyncStream, query: &PullQuery) -> SyncResult<PullPage> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());
        self.simulate_latency().await;

        self.pull_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockReply::Ok(PullPage::ok(Vec::new(), false)))
            .into_result()
    }
}

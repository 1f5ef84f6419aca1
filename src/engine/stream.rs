use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::monitoring::events;

use super::auth::UserContext;
use super::error::{SponsorError, SponsorResult};
use super::types::{SwapRequest, SwapResponse};

/// What a stream produces on every tick.
#[async_trait]
pub trait SwapSource: Send + Sync {
    async fn build(&self, request: &SwapRequest, user: &UserContext) -> SponsorResult<SwapResponse>;

    /// Called with a response that a newer one has replaced.
    fn discard(&self, response: &SwapResponse);
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum StreamUpdate {
    Swap(SwapResponse),
    Error(String),
}

/// Handle to one user's re-quoting task.
#[derive(Debug)]
pub struct SwapStream {
    pub id: Uuid,
    pub user: UserContext,
    requests: watch::Sender<SwapRequest>,
    updates: watch::Receiver<Option<StreamUpdate>>,
    cancel: CancellationToken,
}

impl SwapStream {
    pub fn subscribe(&self) -> watch::Receiver<Option<StreamUpdate>> {
        self.updates.clone()
    }

    /// Updates as a stream. Ends once the stream is stopped.
    pub fn updates(&self) -> impl tokio_stream::Stream<Item = StreamUpdate> + Send + 'static {
        WatchStream::new(self.updates.clone()).filter_map(|update| update)
    }

    pub fn current_request(&self) -> SwapRequest {
        self.requests.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// At most one active stream per user id.
pub struct SwapStreamRegistry {
    streams: DashMap<String, Arc<SwapStream>>,
    source: Arc<dyn SwapSource>,
    period: Duration,
}

impl SwapStreamRegistry {
    pub fn new(source: Arc<dyn SwapSource>, period: Duration) -> Self {
        Self {
            streams: DashMap::new(),
            source,
            period: period.max(Duration::from_millis(10)),
        }
    }

    /// Returns the user's existing stream untouched if one is running.
    pub fn start(&self, user: UserContext, request: SwapRequest) -> Arc<SwapStream> {
        let stream = match self.streams.entry(user.user_id.clone()) {
            Entry::Occupied(existing) => return Arc::clone(existing.get()),
            Entry::Vacant(slot) => {
                let (requests, request_rx) = watch::channel(request);
                let (updates_tx, updates) = watch::channel(None);
                let cancel = CancellationToken::new();
                let stream = Arc::new(SwapStream {
                    id: Uuid::new_v4(),
                    user: user.clone(),
                    requests,
                    updates,
                    cancel: cancel.clone(),
                });
                tokio::spawn(run_stream(
                    Arc::clone(&self.source),
                    user,
                    request_rx,
                    updates_tx,
                    cancel,
                    self.period,
                ));
                slot.insert(Arc::clone(&stream));
                stream
            }
        };
        events::stream_lifecycle(&stream.user.user_id, "started", self.streams.len());
        stream
    }

    pub fn update(&self, user_id: &str, request: SwapRequest) -> SponsorResult<()> {
        {
            let stream = self.streams.get(user_id).ok_or(SponsorError::StreamNotFound)?;
            stream.requests.send_replace(request);
        }
        events::stream_lifecycle(user_id, "updated", self.streams.len());
        Ok(())
    }

    /// Cancels the task; subscribers see the output complete.
    pub fn stop(&self, user_id: &str) -> bool {
        let Some((_, stream)) = self.streams.remove(user_id) else {
            return false;
        };
        stream.cancel.cancel();
        events::stream_lifecycle(user_id, "stopped", self.streams.len());
        true
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<SwapStream>> {
        self.streams.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn shutdown(&self) {
        for entry in self.streams.iter() {
            entry.value().cancel.cancel();
        }
        self.streams.clear();
    }
}

async fn run_stream(
    source: Arc<dyn SwapSource>,
    user: UserContext,
    mut requests: watch::Receiver<SwapRequest>,
    updates: watch::Sender<Option<StreamUpdate>>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<SwapResponse> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
                ticker.reset();
            }
        }

        let request = requests.borrow_and_update().clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.build(&request, &user) => result,
        };
        let update = match result {
            Ok(response) => {
                if let Some(stale) = previous.replace(response.clone()) {
                    source.discard(&stale);
                }
                StreamUpdate::Swap(response)
            }
            Err(err) => {
                debug!(
                    target: "engine::stream",
                    user_id = %user.user_id,
                    error = %err,
                    "stream 重新构建失败"
                );
                StreamUpdate::Error(err.to_string())
            }
        };
        updates.send_replace(Some(update));
    }

    // stream 结束时最后发出的消息一并作废。
    if let Some(last) = previous.take() {
        source.discard(&last);
    }
    debug!(target: "engine::stream", user_id = %user.user_id, "stream 任务结束");
}

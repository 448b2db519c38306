//! Log subscriptions. A listener task polls the node for newly confirmed
//! blocks and forwards the contract events to a dispatcher that runs the
//! handler on a blocking thread, so a slow handler only delays the delivery of
//! events and never the other tasks of the runtime.

use crate::cancel::{cancellation, CancelHandle, Cancellation};
use crate::contract::LogEntry;
use crate::errors::ClientError;
use crate::future::{delay, until_cancelled};
use crate::log::{block_number, fetch_range};
use contract_rpc_common::ContractDescriptor;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use web3::api::Web3;
use web3::Transport;

/// Parameters of a log subscription.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use = "subscribe parameters do nothing unless passed to `Client::subscribe_logs_with`"]
pub struct SubscribeParams {
    /// The first block to deliver events for. When unset only events in
    /// blocks confirmed after the subscription started are delivered.
    pub from_block: Option<u64>,
    /// Only deliver events once their block has this many blocks mined on top
    /// of it.
    pub min_confirmations: u64,
    /// The interval between polls for new blocks. Uses the client
    /// configuration when unset.
    pub poll_interval: Option<Duration>,
}

impl SubscribeParams {
    /// Sets the first block to deliver events for.
    #[allow(clippy::wrong_self_convention)]
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Sets the confirmation depth events are delivered at.
    pub fn min_confirmations(mut self, confirmations: u64) -> Self {
        self.min_confirmations = confirmations;
        self
    }

    /// Sets the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// Handle to a running log subscription.
///
/// Dropping the handle does not stop the subscription, use
/// [`Subscription::cancel`] or `Client::cancel_subscriptions` for that.
#[derive(Debug)]
#[must_use = "subscriptions keep running until cancelled"]
pub struct Subscription {
    id: u64,
    handle: CancelHandle,
    signal: Cancellation,
    listener: JoinHandle<Result<(), ClientError>>,
    dispatcher: JoinHandle<()>,
    registry: Registry,
}

impl Subscription {
    /// The identifier of the subscription within its client.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the subscription. The handler is not invoked for any event after
    /// this returns, an invocation that is already running completes.
    pub fn cancel(&self) {
        self.handle.cancel();
        self.registry.remove(self.id);
    }

    /// Returns true if the subscription was cancelled, either through this
    /// handle or through the signal it was started with.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Waits for the subscription to stop and returns the error that stopped
    /// it, if any. Cancelled subscriptions stop with `Ok(())`.
    ///
    /// Transient transport failures do not stop a subscription, they are
    /// logged and polling resumes after a back-off.
    pub async fn join(self) -> Result<(), ClientError> {
        let result = join(self.listener).await.unwrap_or(Ok(()));
        join(self.dispatcher).await;
        result
    }
}

async fn join<T>(task: JoinHandle<T>) -> Option<T> {
    match task.await {
        Ok(output) => Some(output),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => None,
    }
}

/// The active subscriptions of a client. Registration and removal only ever
/// touch a single entry, so concurrent subscribers do not interfere.
#[derive(Clone, Debug, Default)]
pub(crate) struct Registry {
    next_id: Arc<AtomicU64>,
    active: Arc<Mutex<HashMap<u64, CancelHandle>>>,
}

impl Registry {
    fn register(&self, handle: CancelHandle) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, handle);
        id
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// The number of subscriptions that are still running.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Cancels every active subscription and returns how many were cancelled.
    pub(crate) fn cancel_all(&self) -> usize {
        let handles = self.lock().drain().collect::<Vec<_>>();
        for (_, handle) in &handles {
            handle.cancel();
        }
        handles.len()
    }

    fn lock(&self) -> MutexGuard<HashMap<u64, CancelHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawns the listener and dispatcher tasks of a new subscription.
///
/// # Panics
///
/// Panics when called outside of a Tokio runtime.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_subscription<T, F>(
    web3: Web3<T>,
    descriptor: Arc<ContractDescriptor>,
    params: SubscribeParams,
    poll_interval: Duration,
    block_page_size: u64,
    external: Cancellation,
    registry: &Registry,
    mut handler: F,
) -> Subscription
where
    T: Transport + Send + Sync + 'static,
    T::Out: Send,
    F: FnMut(LogEntry) + Send + 'static,
{
    let (handle, own) = cancellation();
    let signal = own.or(external);
    let id = registry.register(handle.clone());
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let listener = Listener {
        web3,
        descriptor,
        next_block: params.from_block,
        min_confirmations: params.min_confirmations,
        poll_interval: params.poll_interval.unwrap_or(poll_interval),
        block_page_size,
        sender,
    };
    let listener = tokio::spawn({
        let signal = signal.clone();
        let registry = registry.clone();
        async move {
            let result = until_cancelled(&signal, listener.run())
                .await
                .unwrap_or(Ok(()));
            if let Err(err) = &result {
                warn!("log subscription {} stopped: {}", id, err);
            }
            registry.remove(id);
            result
        }
    });

    let dispatcher = tokio::task::spawn_blocking({
        let signal = signal.clone();
        move || {
            while let Some(entry) = receiver.blocking_recv() {
                if signal.is_cancelled() {
                    break;
                }
                handler(entry);
            }
            debug!("log subscription {} dispatcher done", id);
        }
    });

    Subscription {
        id,
        handle,
        signal,
        listener,
        dispatcher,
        registry: registry.clone(),
    }
}

/// The longest back-off after repeated transient failures, as a multiple of
/// the poll interval.
const MAX_BACKOFF_FACTOR: u32 = 32;

/// The polling half of a subscription.
struct Listener<T: Transport> {
    web3: Web3<T>,
    descriptor: Arc<ContractDescriptor>,
    /// The next block to fetch events for. Unset until the first poll when
    /// the subscription only delivers new events.
    next_block: Option<u64>,
    min_confirmations: u64,
    poll_interval: Duration,
    block_page_size: u64,
    sender: mpsc::UnboundedSender<LogEntry>,
}

impl<T: Transport> Listener<T> {
    async fn run(mut self) -> Result<(), ClientError> {
        let mut failures = 0u32;
        loop {
            match self.poll().await {
                Ok(Flow::Continue) => failures = 0,
                Ok(Flow::Closed) => return Ok(()),
                Err(err) if err.is_transient() => {
                    failures = failures.saturating_add(1);
                    warn!(
                        "log subscription poll failed {} time(s), retrying: {}",
                        failures, err
                    );
                }
                Err(err) => return Err(err),
            }

            delay(self.backoff(failures)).await;
        }
    }

    /// Delivers the events of all blocks confirmed since the last poll. The
    /// range is fetched again on the next poll if this one fails.
    async fn poll(&mut self) -> Result<Flow, ClientError> {
        let latest_block = block_number(&self.web3).await?;
        let confirmed = match latest_block.checked_sub(self.min_confirmations) {
            Some(confirmed) => confirmed,
            None => return Ok(Flow::Continue),
        };
        let from_block = *self.next_block.get_or_insert(confirmed + 1);
        if confirmed < from_block {
            return Ok(Flow::Continue);
        }

        let entries = fetch_range(
            &self.web3,
            &self.descriptor,
            from_block,
            confirmed,
            self.block_page_size,
        )
        .await?;
        for entry in entries {
            if self.sender.send(entry).is_err() {
                return Ok(Flow::Closed);
            }
        }
        self.next_block = Some(confirmed + 1);

        Ok(Flow::Continue)
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures)
            .unwrap_or(u32::MAX)
            .min(MAX_BACKOFF_FACTOR);
        self.poll_interval.saturating_mul(factor)
    }
}

/// Whether the listener keeps polling after a successful poll.
enum Flow {
    Continue,
    /// The dispatcher is gone.
    Closed,
}

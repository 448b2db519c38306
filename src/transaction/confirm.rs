//! Transaction confirmation implementation. Confirmation polls the node for
//! the latest block number with an exponential backoff and re-checks the
//! transaction receipt once enough blocks were mined, so that a transaction
//! moved to another block by a re-org is still confirmed at the right depth.
//! Waiting for 0 confirmations means waiting for the transaction to be mined.

use crate::cancel::Cancellation;
use crate::errors::{ClientError, TimeoutLimit};
use crate::future::{delay, timeout, until_cancelled};
use log::debug;
use std::cmp::min;
use std::time::Duration;
use web3::api::Web3;
use web3::helpers;
use web3::types::{TransactionReceipt, H256, U64};
use web3::Transport;

/// A struct with the confirmation parameters.
#[derive(Clone, Debug, PartialEq)]
#[must_use = "confirm parameters do nothing unless waited for"]
pub struct ConfirmParams {
    /// The number of blocks to confirm the transaction with. This is the number
    /// of blocks mined on top of the block where the transaction was mined.
    /// This means that, for example, to just wait for the transaction to be
    /// mined, then the number of confirmations should be 0. Positive non-zero
    /// values indicate that extra blocks should be waited for on top of the
    /// block where the transaction was mined.
    pub confirmations: usize,
    /// Minimal delay between consecutive `eth_blockNumber` calls.
    /// We wait for transaction confirmation by polling node for latest
    /// block number. We use exponential backoff to control how often
    /// we poll the node.
    pub poll_interval_min: Duration,
    /// Maximal delay between consecutive `eth_blockNumber` calls.
    pub poll_interval_max: Duration,
    /// Factor, by which the delay between consecutive `eth_blockNumber`
    /// calls is multiplied after each call.
    pub poll_interval_factor: f32,
    /// The maximum number of blocks to wait for a transaction to get confirmed.
    pub block_timeout: Option<usize>,
    /// The maximum wall-clock time to wait for a transaction to get confirmed.
    pub timeout: Option<Duration>,
}

/// Default minimal delay between polling the node for transaction confirmation.
#[cfg(not(test))]
const DEFAULT_POLL_INTERVAL_MIN: Duration = Duration::from_millis(250);
#[cfg(test)]
const DEFAULT_POLL_INTERVAL_MIN: Duration = Duration::from_millis(0);

/// Default maximal delay between polling the node for transaction confirmation.
#[cfg(not(test))]
const DEFAULT_POLL_INTERVAL_MAX: Duration = Duration::from_millis(7000);
#[cfg(test)]
const DEFAULT_POLL_INTERVAL_MAX: Duration = Duration::from_millis(0);

/// Default factor for increasing delays between node polls.
#[cfg(not(test))]
const DEFAULT_POLL_INTERVAL_FACTOR: f32 = 1.7;
#[cfg(test)]
const DEFAULT_POLL_INTERVAL_FACTOR: f32 = 0.0;

/// The default block timeout to use for confirming transactions.
pub const DEFAULT_BLOCK_TIMEOUT: Option<usize> = Some(25);

/// The default wall-clock timeout to use for confirming transactions.
pub const DEFAULT_TIMEOUT: Option<Duration> = Some(Duration::from_secs(600));

impl ConfirmParams {
    /// Create new confirmation parameters for just confirming that the
    /// transaction was mined but not confirmed with any extra blocks.
    pub fn mined() -> Self {
        ConfirmParams::with_confirmations(0)
    }

    /// Create new confirmation parameters from the specified number of extra
    /// blocks to wait for with the default poll interval.
    pub fn with_confirmations(count: usize) -> Self {
        ConfirmParams {
            confirmations: count,
            poll_interval_min: DEFAULT_POLL_INTERVAL_MIN,
            poll_interval_max: DEFAULT_POLL_INTERVAL_MAX,
            poll_interval_factor: DEFAULT_POLL_INTERVAL_FACTOR,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set new value for [`confirmations`].
    ///
    /// [`confirmations`]: #structfield.confirmations
    #[inline]
    pub fn confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Set new values for exponential backoff settings.
    #[inline]
    pub fn poll_interval(mut self, min: Duration, max: Duration, factor: f32) -> Self {
        self.poll_interval_min = min;
        self.poll_interval_max = max;
        self.poll_interval_factor = factor;
        self
    }

    /// Set new value for [`block_timeout`].
    ///
    /// [`block_timeout`]: #structfield.block_timeout
    #[inline]
    pub fn block_timeout(mut self, block_timeout: Option<usize>) -> Self {
        self.block_timeout = block_timeout;
        self
    }

    /// Set new value for [`timeout`].
    ///
    /// [`timeout`]: #structfield.timeout
    #[inline]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ConfirmParams {
    fn default() -> Self {
        ConfirmParams::mined()
    }
}

/// Waits for a transaction to be confirmed.
///
/// Resolves to `Cancelled` as soon as the cancellation signal fires, whether
/// the loop is waiting on a poll delay or on the node. Cancelling only stops
/// the waiting, the transaction itself stays in the node's pool.
pub async fn wait_for_confirmation<T: Transport>(
    web3: &Web3<T>,
    tx: H256,
    params: ConfirmParams,
    cancel: &Cancellation,
) -> Result<TransactionReceipt, ClientError> {
    let limit = params.timeout;
    let context = ConfirmationContext {
        web3,
        tx,
        params,
        starting_block: None,
    };

    match until_cancelled(cancel, timeout(limit, context.run())).await {
        Some(Some(result)) => result,
        Some(None) => Err(ClientError::Timeout {
            transaction: tx,
            limit: TimeoutLimit::Elapsed(limit.unwrap_or_default()),
        }),
        None => {
            debug!("stopped waiting for transaction {:?}", tx);
            Err(ClientError::Cancelled(tx))
        }
    }
}

/// The state used for waiting for a transaction confirmation.
#[derive(Debug)]
struct ConfirmationContext<'a, T: Transport> {
    web3: &'a Web3<T>,
    /// The transaction hash that is being confirmed.
    tx: H256,
    /// The confirmation parameters (like number of confirming blocks to wait
    /// for and polling interval).
    params: ConfirmParams,
    /// The current block number when confirmation started. This is used for
    /// timeouts.
    starting_block: Option<U64>,
}

impl<T: Transport> ConfirmationContext<'_, T> {
    /// Alternates between checking the transaction and waiting for the block
    /// it needs to be confirmed by.
    async fn run(mut self) -> Result<TransactionReceipt, ClientError> {
        let mut latest_block = None;
        loop {
            let target_block = match self.check(latest_block).await? {
                Check::Confirmed(receipt) => return Ok(receipt),
                Check::Pending(target_block) => target_block,
            };

            latest_block = Some(self.wait_for_blocks(target_block).await?);
        }
    }

    /// Checks if the transaction is confirmed.
    ///
    /// Accepts an optional block number parameter to avoid re-querying the
    /// current block if it is already known.
    async fn check(&mut self, latest_block: Option<U64>) -> Result<Check, ClientError> {
        let latest_block = match latest_block {
            Some(value) => value,
            None => self.block_number().await?,
        };
        let receipt = self
            .web3
            .eth()
            .transaction_receipt(self.tx)
            .await
            .map_err(|err| ClientError::rpc("eth_getTransactionReceipt", err))?;

        let target_block = match receipt.and_then(|receipt| Some((receipt.block_number?, receipt))) {
            Some((tx_block, receipt)) => {
                let target_block = tx_block + self.params.confirmations;

                // Either no extra confirmations are needed, or the transaction
                // was mined before `latest_block` was queried.
                if latest_block >= target_block || self.params.confirmations == 0 {
                    debug!(
                        "transaction {:?} mined in block {} confirmed at block {}",
                        self.tx, tx_block, latest_block
                    );
                    return Ok(Check::Confirmed(receipt));
                }

                debug!(
                    "transaction {:?} mined in block {}, waiting for block {}",
                    self.tx, tx_block, target_block
                );
                target_block
            }
            None => {
                if !self.is_known().await? {
                    return Err(ClientError::Dropped(self.tx));
                }

                // Not mined at `latest_block`, since it was fetched before the
                // receipt. Wait for at least one more block and then the
                // confirmations on top of that.
                latest_block + self.params.confirmations + 1
            }
        };

        if let Some(block_timeout) = self.params.block_timeout {
            let starting_block = *self.starting_block.get_or_insert(latest_block);
            let remaining_blocks = target_block.saturating_sub(starting_block);

            if remaining_blocks > U64::from(block_timeout) {
                return Err(ClientError::Timeout {
                    transaction: self.tx,
                    limit: TimeoutLimit::Blocks(block_timeout),
                });
            }
        }

        Ok(Check::Pending(target_block))
    }

    /// Waits for blocks to be mined. This method polls the latest block number
    /// and waits till the target block number is reached.
    ///
    /// This method returns the latest block number if it is known.
    async fn wait_for_blocks(&self, target_block: U64) -> Result<U64, ClientError> {
        let mut cur_delay = self.params.poll_interval_min;

        loop {
            delay(cur_delay).await;

            let latest_block = self.block_number().await?;
            if target_block <= latest_block {
                break Ok(latest_block);
            }

            cur_delay = min(
                cur_delay.mul_f32(self.params.poll_interval_factor),
                self.params.poll_interval_max,
            );
        }
    }

    async fn block_number(&self) -> Result<U64, ClientError> {
        self.web3
            .eth()
            .block_number()
            .await
            .map_err(|err| ClientError::rpc("eth_blockNumber", err))
    }

    /// Returns false if the node no longer knows the unmined transaction,
    /// meaning it was dropped from its pool.
    async fn is_known(&self) -> Result<bool, ClientError> {
        let transaction = self
            .web3
            .transport()
            .execute("eth_getTransactionByHash", vec![helpers::serialize(&self.tx)])
            .await
            .map_err(|err| ClientError::rpc("eth_getTransactionByHash", err))?;

        Ok(!transaction.is_null())
    }
}

/// The result of checking a transaction confirmation.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum Check {
    /// The transaction is confirmed with a transaction receipt.
    Confirmed(TransactionReceipt),
    /// The transaction is not yet confirmed, and requires additional block
    /// confirmations.
    ///
    /// Contains estimated target block after which the transaction
    /// should be mined and confirmed. Note that waiting for that block does
    /// not guarantee that the transaction is confirmed. An additional
    /// check is required.
    Pending(U64),
}

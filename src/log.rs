//! This module implements retrieving the events emitted by the contract,
//! either as a one-off query over a block range or as a subscription that
//! keeps delivering new events.

mod subscribe;

pub use self::subscribe::{SubscribeParams, Subscription};
pub(crate) use self::subscribe::{spawn_subscription, Registry};

use crate::contract::LogEntry;
use crate::errors::ClientError;
use contract_rpc_common::ContractDescriptor;
use log::debug;
use std::cmp::min;
use std::fmt::{self, Display, Formatter};
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use web3::api::Web3;
use web3::types::{BlockNumber, FilterBuilder};
use web3::Transport;

/// The default poll interval to use for polling logs from the block chain.
#[cfg(not(test))]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// The default poll interval to use for polling logs from the block chain.
#[cfg(test)]
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(0);

/// The default block page size used for querying past events.
pub const DEFAULT_BLOCK_PAGE_SIZE: u64 = 10_000;

/// The upper end of a log query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockTag {
    /// A concrete block number.
    Number(u64),
    /// The latest block, resolved once when the query starts.
    #[default]
    Latest,
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        BlockTag::Number(number)
    }
}

impl Display for BlockTag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            BlockTag::Number(number) => write!(f, "{}", number),
            BlockTag::Latest => f.write_str("latest"),
        }
    }
}

/// Error parsing a block tag from a string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid block {0:?}, expected a block number or \"latest\"")]
pub struct ParseBlockTagError(String);

impl FromStr for BlockTag {
    type Err = ParseBlockTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(BlockTag::Latest);
        }
        parse_block_number(s)
            .map(BlockTag::Number)
            .ok_or_else(|| ParseBlockTagError(s.to_owned()))
    }
}

/// Parses a decimal or `0x` prefixed hexadecimal block number.
pub fn parse_block_number(s: &str) -> Option<u64> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// A query for the events emitted by the contract in a range of blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use = "log queries do nothing unless you pass them to `Client::logs`"]
pub struct LogQuery {
    /// The first block to include.
    pub from_block: u64,
    /// The last block to include.
    pub to_block: BlockTag,
    /// Only include blocks with at least this many blocks mined on top of
    /// them.
    pub min_confirmations: u64,
    /// The page size in blocks to use for a single `eth_getLogs` request.
    /// Uses the client configuration when unset.
    pub block_page_size: Option<NonZeroU64>,
}

impl LogQuery {
    /// Creates a query for all events from genesis to the latest block.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the first block to include.
    #[allow(clippy::wrong_self_convention)]
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    /// Sets the last block to include.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_block(mut self, block: impl Into<BlockTag>) -> Self {
        self.to_block = block.into();
        self
    }

    /// Sets the minimum confirmation depth of included blocks.
    pub fn min_confirmations(mut self, confirmations: u64) -> Self {
        self.min_confirmations = confirmations;
        self
    }

    /// The page size in blocks to use when querying.
    ///
    /// # Panics
    ///
    /// Panics if a block page size of 0 is specified.
    pub fn block_page_size(mut self, value: u64) -> Self {
        self.block_page_size = Some(NonZeroU64::new(value).expect("block page size cannot be 0"));
        self
    }
}

/// Retrieves the contract events matching a query, ordered by block and log
/// index.
///
/// The latest block is read at most once, so the result does not change when
/// new blocks arrive while the pages are fetched.
pub(crate) async fn query_logs<T: Transport>(
    web3: &Web3<T>,
    descriptor: &ContractDescriptor,
    query: &LogQuery,
    default_page_size: u64,
) -> Result<Vec<LogEntry>, ClientError> {
    let tip = match (query.to_block, query.min_confirmations) {
        (BlockTag::Number(_), 0) => None,
        _ => Some(block_number(web3).await?),
    };

    let mut end_block = match query.to_block {
        BlockTag::Number(number) => number,
        BlockTag::Latest => tip.unwrap_or_default(),
    };
    if let Some(tip) = tip.filter(|_| query.min_confirmations > 0) {
        end_block = match tip.checked_sub(query.min_confirmations) {
            Some(confirmed) => min(end_block, confirmed),
            None => return Ok(Vec::new()),
        };
    }

    let page_size = query
        .block_page_size
        .map(NonZeroU64::get)
        .unwrap_or(default_page_size);
    fetch_range(web3, descriptor, query.from_block, end_block, page_size).await
}

/// Retrieves the contract events in `[from_block, to_block]` page by page.
pub(crate) async fn fetch_range<T: Transport>(
    web3: &Web3<T>,
    descriptor: &ContractDescriptor,
    from_block: u64,
    to_block: u64,
    block_page_size: u64,
) -> Result<Vec<LogEntry>, ClientError> {
    let mut pager = PastLogsPager {
        web3,
        descriptor,
        block_page_size: block_page_size.max(1),
        page_block: Some(from_block),
        end_block: to_block,
    };

    let mut entries = Vec::new();
    while let Some(page) = pager.next_page().await? {
        entries.extend(page);
    }
    entries.sort_by_key(LogEntry::position);

    Ok(entries)
}

pub(crate) async fn block_number<T: Transport>(web3: &Web3<T>) -> Result<u64, ClientError> {
    web3.eth()
        .block_number()
        .await
        .map(|number| number.as_u64())
        .map_err(|err| ClientError::rpc("eth_blockNumber", err))
}

/// Internal state for paging though past logs.
struct PastLogsPager<'a, T: Transport> {
    web3: &'a Web3<T>,
    descriptor: &'a ContractDescriptor,

    /// The block page size being used for queries.
    block_page_size: u64,
    /// The block number for the next page, `None` once all pages were
    /// fetched.
    page_block: Option<u64>,
    /// The last block to query, always a concrete block number so that the
    /// range cannot grow while paging.
    end_block: u64,
}

impl<T: Transport> PastLogsPager<'_, T> {
    /// Fetches the next page of contract events or `None` once the range is
    /// exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<LogEntry>>, ClientError> {
        let page_block = match self.page_block {
            Some(block) if block <= self.end_block => block,
            _ => return Ok(None),
        };

        let page_end = min(
            page_block.saturating_add(self.block_page_size - 1),
            self.end_block,
        );
        let filter = FilterBuilder::default()
            .address(vec![self.descriptor.address])
            .from_block(BlockNumber::Number(page_block.into()))
            .to_block(BlockNumber::Number(page_end.into()))
            .build();
        let logs = self
            .web3
            .eth()
            .logs(filter)
            .await
            .map_err(|err| ClientError::rpc("eth_getLogs", err))?;
        debug!(
            "fetched {} logs for blocks {}..={}",
            logs.len(),
            page_block,
            page_end
        );

        let mut entries = Vec::with_capacity(logs.len());
        for log in logs {
            match LogEntry::decode(self.descriptor, log)? {
                Some(entry) => entries.push(entry),
                None => debug!("skipping log that is not a contract event"),
            }
        }

        self.page_block = page_end.checked_add(1);
        Ok(Some(entries))
    }
}

//! The contract client. A `Client` wraps a JSON-RPC transport and performs
//! typed calls, transactions, confirmations and log queries against one
//! deployed contract.

mod event;
mod method;

pub use self::event::LogEntry;
pub use self::method::{CallOptions, CallResult, MethodDefaults};

use self::method::Invocation;
use crate::cancel::Cancellation;
use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::errors::ClientError;
use crate::log::{self, LogQuery, Registry, SubscribeParams, Subscription};
use crate::transaction::confirm::{self, ConfirmParams};
use crate::transaction::{Receipt, Transaction};
use crate::transport::RetryTransport;
use ::log::debug;
use contract_rpc_common::abi::Token;
use contract_rpc_common::{ContractDescriptor, FunctionExt};
use std::sync::Arc;
use std::time::SystemTime;
use web3::api::Web3;
use web3::types::Address;
use web3::Transport;

/// A client for one deployed contract.
///
/// Cloning a client is cheap and clones share the transport, the
/// subscription registry and the read-only descriptor, so a client can be
/// used from many tasks at once. Operations on different transactions do not
/// wait for each other.
#[derive(Clone, Debug)]
pub struct Client<T>
where
    T: Transport + Send + Sync + 'static,
    T::Out: Send + 'static,
{
    web3: Web3<RetryTransport<T>>,
    endpoint: Endpoint,
    descriptor: Arc<ContractDescriptor>,
    config: ClientConfig,
    subscriptions: Registry,
}

#[cfg(feature = "http")]
impl Client<web3::transports::Http> {
    /// Creates a client that talks to the endpoint over HTTP.
    pub fn connect(
        endpoint: Endpoint,
        descriptor: ContractDescriptor,
        config: ClientConfig,
    ) -> Result<Self, web3::Error> {
        let transport = web3::transports::Http::new(endpoint.url().as_str())?;
        Ok(Client::new(transport, endpoint, descriptor, config))
    }
}

impl<T> Client<T>
where
    T: Transport + Send + Sync + 'static,
    T::Out: Send + 'static,
{
    /// Creates a client for the described contract over a transport.
    ///
    /// Note that this does not verify that a contract matching the descriptor
    /// is actually deployed at its address.
    pub fn new(
        transport: T,
        endpoint: Endpoint,
        descriptor: ContractDescriptor,
        config: ClientConfig,
    ) -> Self {
        Client {
            web3: Web3::new(RetryTransport::new(transport, config.request)),
            endpoint,
            descriptor: Arc::new(descriptor),
            config,
            subscriptions: Registry::default(),
        }
    }

    /// Retrieve the underlying web3 provider used by this client.
    pub fn web3(&self) -> Web3<RetryTransport<T>> {
        self.web3.clone()
    }

    /// The endpoint of the client.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The descriptor of the contract.
    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    /// The address of the contract.
    pub fn address(&self) -> Address {
        self.descriptor.address
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs a read-only call of a contract function.
    ///
    /// The function must be declared `view` or `pure` and the arguments must
    /// match one of its overloads. No transaction is broadcast.
    pub async fn call(
        &self,
        name: &str,
        args: &[Token],
        options: CallOptions,
    ) -> Result<CallResult, ClientError> {
        let invocation = Invocation::new(&self.descriptor, name, args, true)?;
        let options = options.with_defaults(&self.config.defaults);
        let request = invocation.call_request(self.descriptor.address, &options);

        debug!(
            "calling {} on {:?}",
            invocation.function.abi_signature(),
            self.descriptor.address
        );
        let bytes = self
            .web3
            .eth()
            .call(request, options.block)
            .await
            .map_err(|err| ClientError::rpc("eth_call", err))?;

        invocation.decode_output(&bytes)
    }

    /// Broadcasts a transaction calling a state-changing contract function.
    ///
    /// Returns as soon as the node accepted the transaction, use
    /// [`Client::confirm`] to wait for it to be mined. The sender is taken
    /// from the options, the client defaults or the endpoint account, in that
    /// order.
    pub async fn send(
        &self,
        name: &str,
        args: &[Token],
        options: CallOptions,
    ) -> Result<Transaction, ClientError> {
        let invocation = Invocation::new(&self.descriptor, name, args, false)?;
        let options = options.with_defaults(&self.config.defaults);
        let from = options
            .from
            .or_else(|| self.endpoint.default_account())
            .ok_or_else(|| ClientError::NoSenderResolved {
                function: name.to_owned(),
            })?;
        let request = invocation.transaction_request(from, self.descriptor.address, &options);

        let hash = self
            .web3
            .eth()
            .send_transaction(request.clone())
            .await
            .map_err(|err| ClientError::rpc("eth_sendTransaction", err))?;
        debug!(
            "sent {} from {:?} as transaction {:?}",
            invocation.function.abi_signature(),
            from,
            hash
        );

        Ok(Transaction {
            hash,
            function: invocation.function.abi_signature(),
            submitted_at: SystemTime::now(),
            request,
        })
    }

    /// Waits until the transaction is mined and `confirmations` more blocks
    /// were mined on top of it, using the configured polling parameters.
    ///
    /// Confirming the same transaction again yields the same receipt as long
    /// as the chain does not re-org.
    pub async fn confirm(
        &self,
        transaction: &Transaction,
        confirmations: usize,
    ) -> Result<Receipt, ClientError> {
        self.confirm_with_cancel(transaction, confirmations, &Cancellation::never())
            .await
    }

    /// Same as [`Client::confirm`] but stops waiting with
    /// `ClientError::Cancelled` when the signal fires. The transaction itself
    /// is not affected.
    pub async fn confirm_with_cancel(
        &self,
        transaction: &Transaction,
        confirmations: usize,
        cancel: &Cancellation,
    ) -> Result<Receipt, ClientError> {
        let params = self.config.confirm.clone().confirmations(confirmations);
        self.confirm_with(transaction, params, cancel).await
    }

    /// Waits for a transaction with explicit confirmation parameters.
    pub async fn confirm_with(
        &self,
        transaction: &Transaction,
        params: ConfirmParams,
        cancel: &Cancellation,
    ) -> Result<Receipt, ClientError> {
        let raw = confirm::wait_for_confirmation(&self.web3, transaction.hash, params, cancel).await?;
        let receipt = Receipt::decode(&self.descriptor, raw)?;
        if !receipt.is_success() {
            return Err(ClientError::TransactionFailed(Box::new(receipt)));
        }

        Ok(receipt)
    }

    /// Retrieves the contract events matching the query, ordered by block
    /// number and log index.
    pub async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, ClientError> {
        log::query_logs(
            &self.web3,
            &self.descriptor,
            query,
            self.config.block_page_size,
        )
        .await
    }

    /// Starts delivering new contract events to `handler` in block and log
    /// index order.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn subscribe_logs<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(LogEntry) + Send + 'static,
    {
        self.subscribe_logs_with(SubscribeParams::default(), Cancellation::never(), handler)
    }

    /// Starts a log subscription with explicit parameters. The subscription
    /// stops when either its handle or `cancel` is cancelled.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn subscribe_logs_with<F>(
        &self,
        params: SubscribeParams,
        cancel: Cancellation,
        handler: F,
    ) -> Subscription
    where
        F: FnMut(LogEntry) + Send + 'static,
    {
        log::spawn_subscription(
            self.web3.clone(),
            self.descriptor.clone(),
            params,
            self.config.poll_interval,
            self.config.block_page_size,
            cancel,
            &self.subscriptions,
            handler,
        )
    }

    /// The number of running log subscriptions of this client and its clones.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Cancels all running log subscriptions and returns how many there were.
    pub fn cancel_subscriptions(&self) -> usize {
        self.subscriptions.cancel_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestPolicy;
    use crate::errors::{SchemaError, TimeoutLimit};
    use crate::test::prelude::*;
    use contract_rpc_common::StateMutability;
    use jsonrpc_core::{Error as JsonrpcError, ErrorCode};
    use serde_json::Value;
    use std::time::Duration;
    use web3::error::Error as Web3Error;
    use web3::types::{BlockNumber, CallRequest, TransactionRequest, H2048, H256, U256};

    fn descriptor() -> ContractDescriptor {
        ContractDescriptor::builder("Token", addr!("0x4242424242424242424242424242424242424242"))
            .function("totalSupply", &[], &["uint256"], StateMutability::View)
            .and_then(|builder| {
                builder.function("balanceOf", &["address"], &["uint256"], StateMutability::View)
            })
            .and_then(|builder| {
                builder.function(
                    "transfer",
                    &["address", "uint256"],
                    &["bool"],
                    StateMutability::NonPayable,
                )
            })
            .and_then(|builder| {
                builder.event(
                    "Transfer",
                    &[("address", true), ("address", true), ("uint256", false)],
                )
            })
            .expect("valid descriptor")
            .build()
    }

    fn sender() -> Address {
        addr!("0x7926223070547d2d15b2ef5e7383e541c338ffe9")
    }

    fn client<T>(transport: T, endpoint: &str) -> Client<T>
    where
        T: Transport + Send + Sync + 'static,
        T::Out: Send + 'static,
    {
        Client::new(
            transport,
            Endpoint::parse(endpoint).expect("valid endpoint"),
            descriptor(),
            ClientConfig::default(),
        )
    }

    fn account_endpoint() -> String {
        format!("http://{:?}:secret@localhost:23889", sender())
    }

    fn receipt_json(hash: H256, block: u64, status: &str, logs: Vec<Value>) -> Value {
        json!({
            "transactionHash": hash,
            "transactionIndex": "0x0",
            "blockNumber": format!("0x{:x}", block),
            "blockHash": H256::from_low_u64_be(block),
            "from": sender(),
            "to": descriptor().address,
            "cumulativeGasUsed": "0x1337",
            "gasUsed": "0x1337",
            "logsBloom": H2048::zero(),
            "logs": logs,
            "status": status,
        })
    }

    fn transfer_log(hash: H256, block: u64, index: u64) -> Value {
        let descriptor = descriptor();
        let topic = descriptor.abi.event("Transfer").expect("declared").signature();
        json!({
            "address": descriptor.address,
            "topics": [topic, H256::from(sender()), H256::from(Address::repeat_byte(0x02))],
            "data": format!("0x{:064x}", 50),
            "blockHash": H256::from_low_u64_be(block),
            "blockNumber": format!("0x{:x}", block),
            "transactionHash": hash,
            "transactionIndex": "0x0",
            "logIndex": format!("0x{:x}", index),
        })
    }

    fn transfer_args() -> Vec<Token> {
        vec![
            Token::Address(Address::repeat_byte(0x02)),
            Token::Uint(50.into()),
        ]
    }

    #[test]
    fn call_decodes_total_supply() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");

        transport.add_response(json!(format!("0x{:064x}", 1_000_000)));
        let result = client
            .call("totalSupply", &[], CallOptions::default())
            .immediate()
            .expect("call succeeds");

        assert_eq!(result.outputs, vec![Token::Uint(U256::from(1_000_000))]);
        transport.assert_request(
            "eth_call",
            &[
                json!(CallRequest {
                    to: Some(client.address()),
                    data: Some(vec![0x18, 0x16, 0x0d, 0xdd].into()),
                    ..Default::default()
                }),
                json!(BlockNumber::Latest),
            ],
        );
        transport.assert_no_more_requests();
    }

    #[test]
    fn call_output_matches_declared_outputs() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");

        transport.add_response(json!(format!("0x{:064x}", 7)));
        let result = client
            .call(
                "balanceOf",
                &[Token::Address(sender())],
                CallOptions::new().from(sender()),
            )
            .immediate()
            .expect("call succeeds");

        assert_eq!(result.len(), 1);
        assert_eq!(result.first(), Some(&Token::Uint(U256::from(7u64))));
    }

    #[test]
    fn call_with_malformed_payload_is_decode_failure() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");

        transport.add_response(json!("0x1234"));
        let err = client
            .call("totalSupply", &[], CallOptions::default())
            .immediate()
            .expect_err("payload too short");

        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[test]
    fn schema_errors_make_no_requests() {
        let transport = TestTransport::new();
        let client = client(transport.clone(), &account_endpoint());

        let err = client
            .call("totalSupply", &[Token::Uint(1.into())], CallOptions::default())
            .immediate()
            .expect_err("wrong arity");
        assert!(matches!(
            err,
            ClientError::SchemaMismatch(SchemaError::ArityMismatch { .. })
        ));

        let err = client
            .send("totalSupply", &[], CallOptions::default())
            .immediate()
            .expect_err("read-only function");
        assert!(matches!(err, ClientError::SchemaMismatch(SchemaError::ReadOnly(_))));

        transport.assert_no_more_requests();
    }

    #[test]
    fn send_uses_endpoint_account() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), &account_endpoint());
        let hash = H256::repeat_byte(0xff);

        transport.add_response(json!(hash));
        let tx = client
            .send(
                "transfer",
                &transfer_args(),
                CallOptions::new().gas_price(100.into()),
            )
            .immediate()
            .expect("broadcast succeeds");

        assert_eq!(tx.hash, hash);
        assert_eq!(tx.function, "transfer(address,uint256)");
        assert_eq!(tx.request.from, sender());
        assert_eq!(tx.request.gas_price, Some(100.into()));
        transport.assert_request("eth_sendTransaction", &[json!(tx.request)]);
        transport.assert_no_more_requests();
    }

    #[test]
    fn send_without_sender() {
        let transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");

        let err = client
            .send("transfer", &transfer_args(), CallOptions::default())
            .immediate()
            .expect_err("no sender");

        assert!(matches!(err, ClientError::NoSenderResolved { function } if function == "transfer"));
        transport.assert_no_more_requests();
    }

    #[test]
    fn rejected_broadcast_is_rpc_failure() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");

        transport.add_error(Web3Error::Rpc(JsonrpcError {
            code: ErrorCode::ServerError(-32000),
            message: "insufficient funds for gas * price + value".into(),
            data: None,
        }));
        let err = client
            .send(
                "transfer",
                &transfer_args(),
                CallOptions::new().from(Address::repeat_byte(0x03)),
            )
            .immediate()
            .expect_err("insufficient balance");

        assert!(matches!(
            err,
            ClientError::Rpc {
                method: "eth_sendTransaction",
                ..
            }
        ));
        assert_eq!(transport.sent(), 1);
    }

    fn sent_transaction(client: &Client<TestTransport>, transport: &mut TestTransport) -> Transaction {
        transport.add_response(json!(H256::repeat_byte(0xff)));
        client
            .send("transfer", &transfer_args(), CallOptions::default())
            .immediate()
            .expect("broadcast succeeds")
    }

    #[test]
    fn confirm_is_idempotent() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), &account_endpoint());
        let tx = sent_transaction(&client, &mut transport);

        for _ in 0..2 {
            transport.add_response(json!("0x9"));
            transport.add_response(receipt_json(
                tx.hash,
                8,
                "0x1",
                vec![transfer_log(tx.hash, 8, 0)],
            ));
        }
        let first = client.confirm(&tx, 0).immediate().expect("confirmed");
        let second = client.confirm(&tx, 0).immediate().expect("confirmed");

        assert_eq!(first, second);
        assert_eq!(first.transaction_hash, tx.hash);
        assert_eq!(first.block_number, 8);
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].event, "Transfer");
    }

    #[test]
    fn reverted_transaction_is_distinct_from_timeout() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), &account_endpoint());
        let tx = sent_transaction(&client, &mut transport);

        transport.add_response(json!("0x9"));
        transport.add_response(receipt_json(tx.hash, 9, "0x0", vec![]));
        let err = client.confirm(&tx, 0).immediate().expect_err("reverted");

        match err {
            ClientError::TransactionFailed(receipt) => {
                assert_eq!(receipt.transaction_hash, tx.hash);
                assert_eq!(receipt.block_number, 9);
            }
            err => panic!("expected transaction failure but got {:?}", err),
        }
    }

    #[test]
    fn confirm_with_unreachable_node_times_out() {
        let client = Client::new(
            HangingTransport::default(),
            Endpoint::parse(&account_endpoint()).expect("valid endpoint"),
            descriptor(),
            ClientConfig::default()
                .confirm(ConfirmParams::mined().timeout(Some(Duration::from_millis(20)))),
        );
        let tx = Transaction {
            hash: H256::repeat_byte(0xff),
            function: "transfer(address,uint256)".to_owned(),
            submitted_at: SystemTime::now(),
            request: TransactionRequest::default(),
        };

        let err = client.confirm(&tx, 3).wait().expect_err("node never answers");

        assert!(matches!(
            err,
            ClientError::Timeout {
                limit: TimeoutLimit::Elapsed(_),
                ..
            }
        ));
        assert_eq!(err.transaction_hash(), Some(tx.hash));
    }

    #[test]
    fn transient_polling_errors_are_retried() {
        let mut transport = TestTransport::new();
        let client = Client::new(
            transport.clone(),
            Endpoint::parse(&account_endpoint()).expect("valid endpoint"),
            descriptor(),
            ClientConfig::default().request(RequestPolicy::default().max_retries(1)),
        );
        let tx = sent_transaction(&client, &mut transport);

        transport.add_error(Web3Error::Unreachable);
        transport.add_response(json!("0x9"));
        transport.add_response(receipt_json(tx.hash, 9, "0x1", vec![]));
        client.confirm(&tx, 0).immediate().expect("confirmed after retry");

        transport.add_error(Web3Error::Unreachable);
        transport.add_error(Web3Error::Unreachable);
        let err = client.confirm(&tx, 0).immediate().expect_err("retries exhausted");
        assert!(err.is_transient());
    }

    #[test]
    fn cancelled_confirmation() {
        let transport = TestTransport::new();
        let client = client(transport.clone(), &account_endpoint());
        let (handle, signal) = crate::cancel::cancellation();
        handle.cancel();

        let tx = Transaction {
            hash: H256::repeat_byte(0xff),
            function: "transfer(address,uint256)".to_owned(),
            submitted_at: SystemTime::now(),
            request: TransactionRequest::default(),
        };
        let err = client
            .confirm_with_cancel(&tx, 0, &signal)
            .immediate()
            .expect_err("cancelled");

        assert!(matches!(err, ClientError::Cancelled(hash) if hash == tx.hash));
        transport.assert_no_more_requests();
    }

    #[test]
    fn logs_are_ordered() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");
        let hash = H256::repeat_byte(0xff);

        transport.add_response(json!("0x20"));
        transport.add_response(json!([
            transfer_log(hash, 12, 1),
            transfer_log(hash, 3, 0),
            transfer_log(hash, 12, 0),
        ]));

        let entries = client.logs(&LogQuery::new()).immediate().expect("logs");

        assert_eq!(
            entries.iter().map(LogEntry::position).collect::<Vec<_>>(),
            [(3, 0), (12, 0), (12, 1)]
        );
    }

    #[test]
    fn clones_share_the_transport() {
        let mut transport = TestTransport::new();
        let client = client(transport.clone(), "http://localhost:8545");
        let clone = client.clone();
        assert!(format!("{:?}", clone).starts_with("Client"));

        transport.add_response(json!(format!("0x{:064x}", 7)));
        let result = clone
            .call("totalSupply", &[], CallOptions::default())
            .immediate()
            .expect("call");

        assert_eq!(result.first(), Some(&Token::Uint(U256::from(7u64))));
        assert_eq!(client.address(), clone.address());
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test]
    async fn subscriptions_are_registered_per_client() {
        let transport = TestTransport::new();
        let client = client(transport, "http://localhost:8545");
        let clone = client.clone();

        let subscription = client.subscribe_logs(|_| ());
        assert_eq!(clone.active_subscriptions(), 1);

        assert_eq!(clone.cancel_subscriptions(), 1);
        assert!(subscription.is_cancelled());
        subscription.join().await.expect("cancelled");
        assert_eq!(client.active_subscriptions(), 0);
    }
}

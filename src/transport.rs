//! Module containing the transport wrapper used by the client. Every JSON-RPC
//! round trip goes through `RetryTransport`, which bounds how long a single
//! request may take and retries requests that failed with a transient
//! transport error.

use crate::config::RequestPolicy;
use crate::errors::is_transient;
use crate::future::{delay, timeout};
use futures::future::BoxFuture;
use futures::FutureExt as _;
use jsonrpc_core::Call;
use log::{debug, warn};
use serde_json::Value;
use web3::error::{Error as Web3Error, TransportError};
use web3::{RequestId, Transport};

/// Methods that broadcast transactions. Retrying them after a lost response
/// could broadcast twice, so they get a single attempt.
const BROADCAST_METHODS: &[&str] = &["eth_sendTransaction", "eth_sendRawTransaction"];

/// A `Transport` that applies a `RequestPolicy` to an inner transport.
#[derive(Clone, Debug)]
pub struct RetryTransport<T> {
    inner: T,
    policy: RequestPolicy,
}

impl<T: Transport> RetryTransport<T> {
    /// Wraps a transport with the given request policy.
    pub fn new(inner: T, policy: RequestPolicy) -> Self {
        RetryTransport { inner, policy }
    }

    /// Returns the wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns the request policy.
    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }
}

impl<T> Transport for RetryTransport<T>
where
    T: Transport + Send + Sync + 'static,
    T::Out: Send + 'static,
{
    type Out = BoxFuture<'static, Result<Value, Web3Error>>;

    fn prepare(&self, method: &str, params: Vec<Value>) -> (RequestId, Call) {
        self.inner.prepare(method, params)
    }

    fn send(&self, id: RequestId, request: Call) -> Self::Out {
        let inner = self.inner.clone();
        let policy = self.policy;
        let method = match &request {
            Call::MethodCall(call) => call.method.clone(),
            Call::Notification(notification) => notification.method.clone(),
            Call::Invalid { .. } => String::new(),
        };
        let retries = if BROADCAST_METHODS.contains(&method.as_str()) {
            0
        } else {
            policy.max_retries
        };

        async move {
            let mut attempt = 0;
            loop {
                let result = timeout(policy.timeout, inner.send(id, request.clone()))
                    .await
                    .unwrap_or_else(|| {
                        Err(Web3Error::Transport(TransportError::Message(format!(
                            "{} timed out after {:?}",
                            method,
                            policy.timeout.unwrap_or_default()
                        ))))
                    });

                match result {
                    Err(err) if is_transient(&err) && attempt < retries => {
                        attempt += 1;
                        warn!(
                            "{} failed with transient error ({}), retry {} of {}",
                            method, err, attempt, retries
                        );
                        delay(policy.backoff_delay(attempt)).await;
                    }
                    result => {
                        if let Err(err) = &result {
                            debug!("{} failed after {} attempt(s): {}", method, attempt + 1, err);
                        }
                        return result;
                    }
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::prelude::*;
    use jsonrpc_core::{Error as JsonrpcError, ErrorCode};
    use std::time::Duration;

    #[test]
    fn passes_requests_through() {
        let mut transport = TestTransport::new();
        let retry = RetryTransport::new(transport.clone(), RequestPolicy::default());

        transport.add_response(json!("0x1"));
        let response = retry
            .execute("eth_blockNumber", vec![])
            .immediate()
            .expect("success");

        assert_eq!(response, json!("0x1"));
        transport.assert_request("eth_blockNumber", &[]);
        transport.assert_no_more_requests();
        assert_eq!(transport.sent(), 1);
    }

    #[test]
    fn retries_transient_errors() {
        let mut transport = TestTransport::new();
        let retry = RetryTransport::new(transport.clone(), RequestPolicy::default());

        transport.add_error(Web3Error::Unreachable);
        transport.add_error(Web3Error::Transport(TransportError::Code(502)));
        transport.add_response(json!("0x2"));
        let response = retry
            .execute("eth_blockNumber", vec![])
            .immediate()
            .expect("success after retries");

        assert_eq!(response, json!("0x2"));
        transport.assert_request("eth_blockNumber", &[]);
        transport.assert_no_more_requests();
        assert_eq!(transport.sent(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let transport = TestTransport::new();
        let retry = RetryTransport::new(
            transport.clone(),
            RequestPolicy::default().max_retries(2),
        );

        let err = retry
            .execute("eth_blockNumber", vec![])
            .immediate()
            .expect_err("no responses");

        assert!(matches!(err, Web3Error::Unreachable));
        assert_eq!(transport.sent(), 3);
    }

    #[test]
    fn does_not_retry_rpc_errors() {
        let mut transport = TestTransport::new();
        let retry = RetryTransport::new(transport.clone(), RequestPolicy::default());

        transport.add_error(Web3Error::Rpc(JsonrpcError::new(ErrorCode::InvalidParams)));
        let err = retry
            .execute("eth_call", vec![])
            .immediate()
            .expect_err("rpc error");

        assert!(matches!(err, Web3Error::Rpc(_)));
        assert_eq!(transport.sent(), 1);
    }

    #[test]
    fn does_not_retry_broadcasts() {
        let mut transport = TestTransport::new();
        let retry = RetryTransport::new(transport.clone(), RequestPolicy::default());

        transport.add_error(Web3Error::Unreachable);
        transport.add_response(json!("0x01"));
        let err = retry
            .execute("eth_sendTransaction", vec![json!({})])
            .immediate()
            .expect_err("broadcast is attempted once");

        assert!(matches!(err, Web3Error::Unreachable));
        assert_eq!(transport.sent(), 1);
    }

    #[test]
    fn times_out_hanging_requests() {
        let retry = RetryTransport::new(
            HangingTransport::default(),
            RequestPolicy::default()
                .timeout(Some(Duration::from_millis(10)))
                .max_retries(1),
        );

        let err = retry
            .execute("eth_blockNumber", vec![])
            .wait()
            .expect_err("request should time out");

        assert!(matches!(err, Web3Error::Transport(TransportError::Message(message)) if message.contains("timed out")));
    }
}

//! Implementation of the request building and response decoding for contract
//! method calls and transactions.

use crate::errors::{ClientError, SchemaError};
use contract_rpc_common::abi::{Function, Token};
use contract_rpc_common::{ContractDescriptor, FunctionExt};
use web3::types::{Address, BlockId, Bytes, CallRequest, TransactionRequest, U256};

/// Default options applied to every call and transaction of a client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodDefaults {
    /// Default sender of calls and transactions.
    pub from: Option<Address>,
    /// Default gas amount to use for transactions.
    pub gas: Option<U256>,
    /// Default gas price to use for transactions.
    pub gas_price: Option<U256>,
}

/// Options of a single call or transaction. Unset options fall back to the
/// client's `MethodDefaults` and then to the node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOptions {
    /// The sender. Transactions without a sender use the endpoint account.
    pub from: Option<Address>,
    /// The gas limit.
    pub gas: Option<U256>,
    /// The gas price.
    pub gas_price: Option<U256>,
    /// The amount of ether to transfer.
    pub value: Option<U256>,
    /// The sender nonce. Only used for transactions.
    pub nonce: Option<U256>,
    /// The block to execute a read-only call against, latest when unset.
    pub block: Option<BlockId>,
}

impl CallOptions {
    /// Creates empty call options.
    pub fn new() -> Self {
        Default::default()
    }

    /// Specify the sender.
    pub fn from(mut self, value: Address) -> Self {
        self.from = Some(value);
        self
    }

    /// Specify the amount of gas to use.
    pub fn gas(mut self, value: U256) -> Self {
        self.gas = Some(value);
        self
    }

    /// Specify the gas price to use.
    pub fn gas_price(mut self, value: U256) -> Self {
        self.gas_price = Some(value);
        self
    }

    /// Specify how much ETH to transfer with the transaction.
    pub fn value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// Specify the nonce of the transaction.
    pub fn nonce(mut self, value: U256) -> Self {
        self.nonce = Some(value);
        self
    }

    /// Specify the block to execute a read-only call against.
    pub fn block(mut self, value: BlockId) -> Self {
        self.block = Some(value);
        self
    }

    /// Apply method defaults to unset options.
    pub fn with_defaults(mut self, defaults: &MethodDefaults) -> Self {
        self.from = self.from.or(defaults.from);
        self.gas = self.gas.or(defaults.gas);
        self.gas_price = self.gas_price.or(defaults.gas_price);
        self
    }
}

/// The decoded outputs of a read-only call, one token per declared output.
///
/// Integer outputs are 256-bit `Token::Uint` or `Token::Int` values and are
/// never truncated.
#[derive(Clone, Debug, PartialEq)]
pub struct CallResult {
    /// The output tokens in declaration order.
    pub outputs: Vec<Token>,
}

impl CallResult {
    /// The number of outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns true if the function declares no outputs.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Returns the first output, which is all of it for most functions.
    pub fn first(&self) -> Option<&Token> {
        self.outputs.first()
    }

    /// Returns the outputs.
    pub fn into_outputs(self) -> Vec<Token> {
        self.outputs
    }
}

/// A method invocation that passed the schema checks.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    pub function: &'a Function,
    pub data: Bytes,
}

impl<'a> Invocation<'a> {
    /// Resolves the function and encodes its arguments. `read_only` states
    /// whether the invocation is a call or a transaction.
    pub fn new(
        descriptor: &'a ContractDescriptor,
        name: &str,
        args: &[Token],
        read_only: bool,
    ) -> Result<Self, ClientError> {
        let function = descriptor.resolve_function(name, args)?;
        match (read_only, function.is_read_only()) {
            (true, false) => return Err(SchemaError::NotReadOnly(name.to_owned()).into()),
            (false, true) => return Err(SchemaError::ReadOnly(name.to_owned()).into()),
            _ => {}
        }

        let data = function
            .encode_input(args)
            .map_err(|source| ClientError::Abi {
                function: function.abi_signature(),
                source,
            })?;

        Ok(Invocation {
            function,
            data: data.into(),
        })
    }

    /// Builds the `eth_call` request.
    pub fn call_request(&self, to: Address, options: &CallOptions) -> CallRequest {
        CallRequest {
            from: options.from,
            to: Some(to),
            gas: options.gas,
            gas_price: options.gas_price,
            value: options.value,
            data: Some(self.data.clone()),
            ..Default::default()
        }
    }

    /// Builds the `eth_sendTransaction` request.
    pub fn transaction_request(
        &self,
        from: Address,
        to: Address,
        options: &CallOptions,
    ) -> TransactionRequest {
        TransactionRequest {
            from,
            to: Some(to),
            gas: options.gas,
            gas_price: options.gas_price,
            value: options.value,
            nonce: options.nonce,
            data: Some(self.data.clone()),
            ..Default::default()
        }
    }

    /// Decodes the raw return data of a call.
    pub fn decode_output(&self, bytes: &Bytes) -> Result<CallResult, ClientError> {
        let outputs = self.function.decode_output(&bytes.0).map_err(|err| {
            ClientError::decode(format!("{} output", self.function.abi_signature()), err)
        })?;

        Ok(CallResult { outputs })
    }
}

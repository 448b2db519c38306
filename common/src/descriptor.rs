//! The contract descriptor: the address of one deployed contract together with
//! the ABI used to encode calls to it and decode what it returns and emits.

use crate::abiext::{FunctionExt, ParamTypeExt};
use crate::errors::SchemaError;
use crate::Abi;
use ethabi::{Event, EventParam, Function, Param, ParamType, StateMutability, Token};
use std::collections::BTreeMap;
use web3::types::{Address, H256};

/// Describes a deployed contract. It is read-only once constructed.
#[derive(Clone, Debug)]
pub struct ContractDescriptor {
    /// The contract name, empty for unnamed contracts.
    pub name: String,
    /// The address at which the contract is deployed.
    pub address: Address,
    /// The contract interface.
    pub abi: Abi,
}

impl ContractDescriptor {
    /// Creates a descriptor for a contract with the given ABI at an address.
    pub fn new(name: impl Into<String>, address: Address, abi: Abi) -> Self {
        ContractDescriptor {
            name: name.into(),
            address,
            abi,
        }
    }

    /// Starts building a descriptor from individual function and event
    /// signatures.
    pub fn builder(name: impl Into<String>, address: Address) -> DescriptorBuilder {
        DescriptorBuilder::new(name, address)
    }

    /// Returns all overloads of a function by name.
    pub fn functions(&self, name: &str) -> &[Function] {
        self.abi
            .functions
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Finds the overload of `name` accepting the given arguments.
    ///
    /// Overloads are first narrowed by argument count and then by the type of
    /// each token, the first overload that type checks is returned.
    pub fn resolve_function(&self, name: &str, args: &[Token]) -> Result<&Function, SchemaError> {
        let candidates = self.candidates(name, args.len())?;
        candidates
            .into_iter()
            .find(|function| Token::types_check(args, &function.input_types()))
            .ok_or_else(|| SchemaError::TypeMismatch(name.to_owned()))
    }

    /// Finds the overload of `name` whose inputs can be parsed from the given
    /// strings and returns it together with the parsed arguments.
    pub fn resolve_function_str<S>(
        &self,
        name: &str,
        args: &[S],
    ) -> Result<(&Function, Vec<Token>), SchemaError>
    where
        S: AsRef<str>,
    {
        let mut first_error = None;
        for function in self.candidates(name, args.len())? {
            match parse_args(function, args) {
                Ok(tokens) => return Ok((function, tokens)),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| SchemaError::TypeMismatch(name.to_owned())))
    }

    /// Returns the declared (non-anonymous) event whose signature hash
    /// matches the given log topic.
    pub fn event_by_topic(&self, topic: &H256) -> Option<&Event> {
        self.abi
            .events()
            .find(|event| !event.anonymous && event.signature() == *topic)
    }

    fn candidates(&self, name: &str, arity: usize) -> Result<Vec<&Function>, SchemaError> {
        let overloads = self.functions(name);
        if overloads.is_empty() {
            return Err(SchemaError::UnknownFunction(name.to_owned()));
        }

        let candidates = overloads
            .iter()
            .filter(|function| function.inputs.len() == arity)
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(SchemaError::ArityMismatch {
                function: name.to_owned(),
                expected: overloads.iter().map(|f| f.inputs.len()).collect(),
                actual: arity,
            });
        }

        Ok(candidates)
    }
}

/// Converts argument strings into tokens per the function's input types.
pub fn parse_args<S>(function: &Function, args: &[S]) -> Result<Vec<Token>, SchemaError>
where
    S: AsRef<str>,
{
    if function.inputs.len() != args.len() {
        return Err(SchemaError::ArityMismatch {
            function: function.name.clone(),
            expected: vec![function.inputs.len()],
            actual: args.len(),
        });
    }

    function
        .inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, value))| {
            param
                .kind
                .tokenize(value.as_ref())
                .ok_or_else(|| SchemaError::InvalidArgument {
                    function: function.name.clone(),
                    index,
                    kind: param.kind.to_string(),
                    value: value.as_ref().to_owned(),
                })
        })
        .collect()
}

/// Builder for a `ContractDescriptor` from Solidity type strings.
#[derive(Clone, Debug)]
#[must_use = "descriptor builders do nothing unless you `build` them"]
pub struct DescriptorBuilder {
    name: String,
    address: Address,
    functions: BTreeMap<String, Vec<Function>>,
    events: BTreeMap<String, Vec<Event>>,
}

impl DescriptorBuilder {
    /// Creates an empty builder for a contract at an address.
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        DescriptorBuilder {
            name: name.into(),
            address,
            functions: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }

    /// Declares a function from its input and output type strings.
    pub fn function(
        mut self,
        name: &str,
        inputs: &[&str],
        outputs: &[&str],
        mutability: StateMutability,
    ) -> Result<Self, SchemaError> {
        #[allow(deprecated)]
        let function = Function {
            name: name.to_owned(),
            inputs: params(inputs)?,
            outputs: params(outputs)?,
            constant: None,
            state_mutability: mutability,
        };
        self.functions
            .entry(name.to_owned())
            .or_default()
            .push(function);
        Ok(self)
    }

    /// Declares an event from `(type, indexed)` pairs.
    pub fn event(mut self, name: &str, inputs: &[(&str, bool)]) -> Result<Self, SchemaError> {
        let inputs = inputs
            .iter()
            .enumerate()
            .map(|(index, (kind, indexed))| {
                Ok(EventParam {
                    name: format!("arg{}", index),
                    kind: ParamType::parse_type(kind)?,
                    indexed: *indexed,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        let event = Event {
            name: name.to_owned(),
            inputs,
            anonymous: false,
        };
        self.events.entry(name.to_owned()).or_default().push(event);
        Ok(self)
    }

    /// Finishes building the descriptor.
    pub fn build(self) -> ContractDescriptor {
        let abi = Abi {
            constructor: None,
            functions: self.functions,
            events: self.events,
            errors: BTreeMap::new(),
            receive: false,
            fallback: false,
        };
        ContractDescriptor::new(self.name, self.address, abi)
    }
}

fn params(kinds: &[&str]) -> Result<Vec<Param>, SchemaError> {
    kinds
        .iter()
        .map(|kind| {
            Ok(Param {
                name: String::new(),
                kind: ParamType::parse_type(kind)?,
                internal_type: None,
            })
        })
        .collect()
}

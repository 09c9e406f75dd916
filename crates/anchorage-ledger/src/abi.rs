//! Contract interface: the static table of entry points we call and their
//! typed arguments, encoded with `ethers::abi`.
//!
//! Entry points are never dispatched by name at runtime; every call goes
//! through a typed request below, and the table is checked against the
//! deployed contract's ABI JSON at startup.

use ethers::abi::{Abi, Function, Param, ParamType, StateMutability, Token};
use ethers::types::U256;
use serde::Deserialize;

use anchorage_core::Address;

use crate::error::{LedgerError, Result};
use crate::rpc::{from_h160, to_h160};

/// The contract entry points this service depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContractFunction {
    /// `storeDataHash(string ipfsHash, string dataType, address device, bytes32 dataHash)`
    StoreDataHash,
    /// `getDataHash(uint256 index) view returns (string)`
    GetDataHash,
}

impl ContractFunction {
    pub const ALL: [ContractFunction; 2] = [ContractFunction::StoreDataHash, ContractFunction::GetDataHash];

    pub fn name(self) -> &'static str {
        match self {
            ContractFunction::StoreDataHash => "storeDataHash",
            ContractFunction::GetDataHash => "getDataHash",
        }
    }

    pub fn inputs(self) -> Vec<ParamType> {
        match self {
            ContractFunction::StoreDataHash => vec![
                ParamType::String,
                ParamType::String,
                ParamType::Address,
                ParamType::FixedBytes(32),
            ],
            ContractFunction::GetDataHash => vec![ParamType::Uint(256)],
        }
    }

    pub fn outputs(self) -> Vec<ParamType> {
        match self {
            ContractFunction::StoreDataHash => Vec::new(),
            ContractFunction::GetDataHash => vec![ParamType::String],
        }
    }

    fn input_names(self) -> &'static [&'static str] {
        match self {
            ContractFunction::StoreDataHash => &["ipfsHash", "dataType", "device", "dataHash"],
            ContractFunction::GetDataHash => &["index"],
        }
    }

    /// The entry point as an ABI function definition.
    #[allow(deprecated)]
    pub fn function(self) -> Function {
        let inputs = self
            .input_names()
            .iter()
            .zip(self.inputs())
            .map(|(name, kind)| param(name, kind))
            .collect();
        let outputs = self.outputs().into_iter().map(|kind| param("", kind)).collect();
        let state_mutability = match self {
            ContractFunction::StoreDataHash => StateMutability::NonPayable,
            ContractFunction::GetDataHash => StateMutability::View,
        };
        Function {
            name: self.name().to_string(),
            inputs,
            outputs,
            constant: None,
            state_mutability,
        }
    }

    /// Canonical signature, e.g. `getDataHash(uint256)`.
    pub fn signature(self) -> String {
        let inputs: Vec<String> = self.inputs().iter().map(ParamType::to_string).collect();
        format!("{}({})", self.name(), inputs.join(","))
    }

    pub fn selector(self) -> [u8; 4] {
        self.function().short_signature()
    }

    /// Identify the entry point a piece of call data targets.
    pub fn from_call_data(data: &[u8]) -> Option<Self> {
        let sel = data.get(..4)?;
        Self::ALL.into_iter().find(|f| f.selector().as_slice() == sel)
    }

    fn arguments(self, data: &[u8]) -> Result<Vec<Token>> {
        match data.get(..4) {
            Some(sel) if sel == self.selector().as_slice() => {
                Ok(self.function().decode_input(&data[4..])?)
            }
            _ => Err(LedgerError::Abi(format!("call data is not {}", self.signature()))),
        }
    }
}

fn param(name: &str, kind: ParamType) -> Param {
    Param {
        name: name.to_string(),
        kind,
        internal_type: None,
    }
}

/// Arguments of `storeDataHash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreDataHash {
    pub cid: String,
    pub data_type: String,
    pub device_address: Address,
    pub data_hash: [u8; 32],
}

impl StoreDataHash {
    pub fn encode_call(&self) -> Result<Vec<u8>> {
        let call = ContractFunction::StoreDataHash.function().encode_input(&[
            Token::String(self.cid.clone()),
            Token::String(self.data_type.clone()),
            Token::Address(to_h160(&self.device_address)),
            Token::FixedBytes(self.data_hash.to_vec()),
        ])?;
        Ok(call)
    }

    pub fn decode_call(data: &[u8]) -> Result<Self> {
        match ContractFunction::StoreDataHash.arguments(data)?.as_slice() {
            [Token::String(cid), Token::String(data_type), Token::Address(device), Token::FixedBytes(hash)] => {
                let data_hash = hash
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Abi("dataHash is not 32 bytes".into()))?;
                Ok(Self {
                    cid: cid.clone(),
                    data_type: data_type.clone(),
                    device_address: from_h160(*device),
                    data_hash,
                })
            }
            _ => Err(LedgerError::Abi("unexpected storeDataHash arguments".into())),
        }
    }
}

/// Arguments of `getDataHash`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetDataHash {
    pub index: u64,
}

impl GetDataHash {
    pub fn encode_call(&self) -> Result<Vec<u8>> {
        let call = ContractFunction::GetDataHash
            .function()
            .encode_input(&[Token::Uint(U256::from(self.index))])?;
        Ok(call)
    }

    pub fn decode_call(data: &[u8]) -> Result<Self> {
        match ContractFunction::GetDataHash.arguments(data)?.as_slice() {
            [Token::Uint(index)] if index.bits() <= 64 => Ok(Self {
                index: index.as_u64(),
            }),
            [Token::Uint(_)] => Err(LedgerError::Abi("index does not fit in 64 bits".into())),
            _ => Err(LedgerError::Abi("unexpected getDataHash arguments".into())),
        }
    }

    pub fn encode_output(cid: &str) -> Vec<u8> {
        ethers::abi::encode(&[Token::String(cid.to_string())])
    }

    pub fn decode_output(data: &[u8]) -> Result<String> {
        match ContractFunction::GetDataHash.function().decode_output(data)?.pop() {
            Some(Token::String(cid)) => Ok(cid),
            _ => Err(LedgerError::Abi("unexpected getDataHash output".into())),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AbiDocument {
    Bare(Abi),
    Artifact { abi: Abi },
}

/// The contract interface as declared by a deployment's ABI JSON.
#[derive(Clone, Debug)]
pub struct ContractInterface {
    abi: Abi,
}

impl ContractInterface {
    /// Parse a bare ABI array or a build artifact carrying an `abi` field.
    pub fn parse(json: &str) -> Result<Self> {
        let doc: AbiDocument = serde_json::from_str(json)
            .map_err(|e| LedgerError::Abi(format!("unreadable contract ABI: {}", e)))?;
        let abi = match doc {
            AbiDocument::Bare(abi) | AbiDocument::Artifact { abi } => abi,
        };
        Ok(Self { abi })
    }

    /// Names of all declared functions.
    pub fn function_names(&self) -> Vec<&str> {
        self.abi.functions.keys().map(String::as_str).collect()
    }

    /// Check that `function` is declared with exactly the expected types.
    pub fn require(&self, function: ContractFunction) -> Result<()> {
        let candidates = self
            .abi
            .functions
            .get(function.name())
            .map(Vec::as_slice)
            .unwrap_or_default();

        if candidates.is_empty() {
            return Err(LedgerError::Abi(format!(
                "contract declares no `{}` (declared: {})",
                function.name(),
                self.function_names().join(", ")
            )));
        }

        let (inputs, outputs) = (function.inputs(), function.outputs());
        if candidates
            .iter()
            .any(|f| params_match(&f.inputs, &inputs) && params_match(&f.outputs, &outputs))
        {
            Ok(())
        } else {
            Err(LedgerError::Abi(format!(
                "contract `{}` does not match {}",
                function.name(),
                function.signature()
            )))
        }
    }

    /// Check every entry point in the static table.
    pub fn validate(&self) -> Result<()> {
        ContractFunction::ALL
            .into_iter()
            .try_for_each(|function| self.require(function))
    }
}

fn params_match(params: &[Param], expected: &[ParamType]) -> bool {
    params.iter().map(|p| &p.kind).eq(expected.iter())
}

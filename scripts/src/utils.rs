//! Utilities for the deploy scripts.

use alloy::{
    dyn_abi::{DynSolValue, JsonAbiExt, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::{Address, Bytes, B256, U256},
};

use crate::{
    client::ChainClient,
    constants::{NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT},
    errors::ScriptError,
};

/// Coerce string arguments into values of the given ABI parameter types
fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>, ScriptError> {
    if params.len() != args.len() {
        return Err(ScriptError::CalldataConstruction(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
            ty.coerce_str(arg).map_err(|e| {
                ScriptError::CalldataConstruction(format!("argument `{}` ({ty}): {e}", param.name))
            })
        })
        .collect()
}

/// ABI-encode constructor arguments, without the creation bytecode
pub fn encode_constructor_args(abi: &JsonAbi, args: &[String]) -> Result<Bytes, ScriptError> {
    let constructor = match &abi.constructor {
        Some(constructor) => constructor,
        None if args.is_empty() => return Ok(Bytes::new()),
        None => {
            return Err(ScriptError::CalldataConstruction(format!(
                "no constructor, but {} arguments given",
                args.len()
            )))
        }
    };

    let values = coerce_args(&constructor.inputs, args)?;
    constructor
        .abi_encode_input(&values)
        .map(Bytes::from)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}

/// Encode a call to the named function, selector included.
///
/// Overloads are disambiguated by argument count.
pub fn encode_function_call(
    abi: &JsonAbi,
    name: &str,
    args: &[String],
) -> Result<Bytes, ScriptError> {
    let function = abi
        .function(name)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
        .ok_or_else(|| {
            ScriptError::CalldataConstruction(format!(
                "no function `{name}` taking {} arguments",
                args.len()
            ))
        })?;

    let values = coerce_args(&function.inputs, args)?;
    function
        .abi_encode_input(&values)
        .map(Bytes::from)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}

/// Concatenate creation bytecode and encoded constructor arguments
pub fn deploy_code(bytecode: &Bytes, encoded_args: &Bytes) -> Bytes {
    let mut code = bytecode.to_vec();
    code.extend_from_slice(encoded_args);
    code.into()
}

/// Read an address stored in the low-order bytes of a storage slot
pub async fn read_address_slot(
    client: &impl ChainClient,
    contract: Address,
    slot: B256,
) -> Result<Address, ScriptError> {
    let value = client.storage_at(contract, U256::from_be_bytes(slot.0)).await?;
    let bytes: [u8; NUM_BYTES_STORAGE_SLOT] = value.to_be_bytes();

    Ok(Address::from_slice(
        &bytes[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..NUM_BYTES_STORAGE_SLOT],
    ))
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{address, keccak256},
        sol_types::SolValue,
    };
    use serde_json::json;

    use super::*;

    fn vault_abi() -> JsonAbi {
        serde_json::from_value(json!([
            {
                "type": "constructor",
                "inputs": [
                    { "name": "token", "type": "address", "internalType": "address" },
                    { "name": "rate", "type": "uint256", "internalType": "uint256" }
                ],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "initialize",
                "inputs": [
                    { "name": "relayer", "type": "string", "internalType": "string" }
                ],
                "outputs": [],
                "stateMutability": "nonpayable"
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_encode_constructor_args() {
        let token = address!("0x00000000000000000000000000000000000000c0");
        let args = [token.to_string(), "100".to_string()];

        let encoded = encode_constructor_args(&vault_abi(), &args).unwrap();
        assert_eq!(encoded.to_vec(), (token, U256::from(100)).abi_encode_params());
    }

    #[test]
    fn test_encode_constructor_args_mismatch() {
        let res = encode_constructor_args(&vault_abi(), &["0x00".to_string()]);
        assert!(matches!(res, Err(ScriptError::CalldataConstruction(_))));

        let res = encode_constructor_args(
            &vault_abi(),
            &["not an address".to_string(), "1".to_string()],
        );
        assert!(matches!(res, Err(ScriptError::CalldataConstruction(_))));
    }

    #[test]
    fn test_no_constructor() {
        let abi = JsonAbi::new();

        assert!(encode_constructor_args(&abi, &[]).unwrap().is_empty());
        assert!(encode_constructor_args(&abi, &["1".to_string()]).is_err());
    }

    #[test]
    fn test_encode_function_call() {
        let calldata =
            encode_function_call(&vault_abi(), "initialize", &["Taco-Vault".to_string()]).unwrap();

        assert_eq!(&calldata[..4], &keccak256("initialize(string)")[..4]);
        assert_eq!(
            calldata[4..].to_vec(),
            ("Taco-Vault".to_string(),).abi_encode_params()
        );
    }

    #[test]
    fn test_deploy_code() {
        let code = deploy_code(&Bytes::from_static(&[0x60, 0x80]), &Bytes::from_static(&[0x01]));
        assert_eq!(&code[..], &[0x60, 0x80, 0x01]);
    }
}

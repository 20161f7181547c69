//! Converts alloy-core `DynSolValue` → Chainflow `DecodedValue`.

use alloy_core::dyn_abi::DynSolValue;
use chainflow_core::event::DecodedValue;

/// Convert a decoded `DynSolValue` into a `DecodedValue`.
pub fn normalize(val: DynSolValue) -> DecodedValue {
    match val {
        DynSolValue::Bool(b) => DecodedValue::Bool(b),

        DynSolValue::Int(i, bits) => {
            if bits <= 128 {
                match i128::try_from(i) {
                    Ok(v) => DecodedValue::Int(v),
                    Err(_) => DecodedValue::BigInt(i.to_string()),
                }
            } else {
                DecodedValue::BigInt(i.to_string())
            }
        }

        DynSolValue::Uint(u, bits) => {
            if bits <= 128 {
                match u128::try_from(u) {
                    Ok(v) => DecodedValue::Uint(v),
                    Err(_) => DecodedValue::BigUint(u.to_string()),
                }
            } else {
                DecodedValue::BigUint(u.to_string())
            }
        }

        DynSolValue::FixedBytes(word, size) => DecodedValue::Bytes(word[..size].to_vec().into()),

        DynSolValue::Bytes(b) => DecodedValue::Bytes(b.into()),

        DynSolValue::String(s) => DecodedValue::Str(s),

        DynSolValue::Address(a) => DecodedValue::Address(a),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            DecodedValue::Array(vals.into_iter().map(normalize).collect())
        }

        DynSolValue::Tuple(fields) => DecodedValue::Tuple(
            fields
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), normalize(v)))
                .collect(),
        ),

        DynSolValue::Function(f) => DecodedValue::Bytes(f.to_vec().into()),
    }
}

/// Like [`normalize`], but names tuple fields after the ABI components.
pub fn normalize_named(val: DynSolValue, component_names: &[String]) -> DecodedValue {
    match val {
        DynSolValue::Tuple(fields) if fields.len() == component_names.len() => DecodedValue::Tuple(
            fields
                .into_iter()
                .zip(component_names)
                .enumerate()
                .map(|(i, (v, name))| (positional(name, i), normalize(v)))
                .collect(),
        ),
        other => normalize(other),
    }
}

/// The parameter name, or its position when the ABI leaves it unnamed.
pub fn positional(name: &str, index: usize) -> String {
    if name.is_empty() {
        index.to_string()
    } else {
        name.to_string()
    }
}

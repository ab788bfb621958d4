//! Pseudo-type factories for primitive values.
//!
//! JSON-native primitives are normally written inline and never reach these
//! factories during serialization. They still exist so that every primitive has
//! a registry entry, and they carry the values JSON cannot express directly:
//! `undefined`, big integers, symbols and non-finite numbers.

use async_trait::async_trait;

use crate::class::{intrinsic, ClassRef};
use crate::factory::{Factory, Snapshot};
use crate::value::{Symbol, Value};
use crate::{GraphSnapError, Result};

/// The primitive pseudo-types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Number,
    BigInt,
    Boolean,
    Symbol,
    Undefined,
    Null,
}

impl Primitive {
    pub const ALL: [Primitive; 7] = [
        Primitive::String,
        Primitive::Number,
        Primitive::BigInt,
        Primitive::Boolean,
        Primitive::Symbol,
        Primitive::Undefined,
        Primitive::Null,
    ];

    fn class(self) -> &'static ClassRef {
        match self {
            Primitive::String => intrinsic::string(),
            Primitive::Number => intrinsic::number(),
            Primitive::BigInt => intrinsic::bigint(),
            Primitive::Boolean => intrinsic::boolean(),
            Primitive::Symbol => intrinsic::symbol(),
            Primitive::Undefined => intrinsic::undefined(),
            Primitive::Null => intrinsic::null(),
        }
    }
}

/// Factory for one primitive pseudo-type.
#[derive(Debug, Clone)]
pub struct PrimitiveFactory {
    primitive: Primitive,
}

impl PrimitiveFactory {
    pub fn new(primitive: Primitive) -> Self {
        Self { primitive }
    }

    fn mismatch(&self, found: &str) -> GraphSnapError {
        GraphSnapError::invalid_snapshot(
            self.primitive.class().name(),
            format!("unexpected {found}"),
        )
    }
}

fn encode_number(n: f64) -> Value {
    if n.is_nan() {
        Value::from("NaN")
    } else if n == f64::INFINITY {
        Value::from("Infinity")
    } else if n == f64::NEG_INFINITY {
        Value::from("-Infinity")
    } else {
        Value::Number(n)
    }
}

fn decode_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

#[async_trait]
impl Factory for PrimitiveFactory {
    fn type_identity(&self) -> &ClassRef {
        self.primitive.class()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        let plain = match (self.primitive, value) {
            (Primitive::String, Value::String(s)) => Value::String(s.clone()),
            (Primitive::Number, Value::Number(n)) => encode_number(*n),
            (Primitive::BigInt, Value::BigInt(i)) => Value::String(i.to_string()),
            (Primitive::Boolean, Value::Bool(b)) => Value::Bool(*b),
            (Primitive::Symbol, Value::Symbol(symbol)) => symbol
                .description()
                .map(Value::from)
                .unwrap_or(Value::Null),
            (Primitive::Undefined, Value::Undefined) | (Primitive::Null, Value::Null) => {
                Value::Null
            }
            (_, other) => return Err(self.mismatch(&format!("{other:?}"))),
        };
        Ok(Snapshot::Value(plain))
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let plain = snapshot.into_value(self.primitive.class().name())?;
        match (self.primitive, plain) {
            (Primitive::String, Value::String(s)) => Ok(Value::String(s)),
            (Primitive::Number, plain) => decode_number(&plain)
                .map(Value::Number)
                .ok_or_else(|| self.mismatch(&format!("{plain:?}"))),
            (Primitive::BigInt, Value::String(s)) => s
                .parse::<i128>()
                .map(Value::BigInt)
                .map_err(|e| self.mismatch(&format!("bigint literal '{s}': {e}"))),
            (Primitive::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Primitive::Symbol, Value::String(description)) => {
                Ok(Value::Symbol(Symbol::new(Some(description))))
            }
            (Primitive::Symbol, Value::Null) => Ok(Value::Symbol(Symbol::new(None))),
            (Primitive::Undefined, _) => Ok(Value::Undefined),
            (Primitive::Null, _) => Ok(Value::Null),
            (_, other) => Err(self.mismatch(&format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(primitive: Primitive, value: Value) -> Value {
        let factory = PrimitiveFactory::new(primitive);
        let snapshot = factory.to_plain(&value).await.unwrap();
        factory.from_plain(snapshot).await.unwrap()
    }

    #[tokio::test]
    async fn test_non_finite_numbers() {
        for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.5] {
            let back = roundtrip(Primitive::Number, Value::Number(n)).await;
            assert!(back.deep_equals(&Value::Number(n)));
        }
    }

    #[tokio::test]
    async fn test_bigint_beyond_f64_precision() {
        let big = i128::MAX - 7;
        let back = roundtrip(Primitive::BigInt, Value::BigInt(big)).await;
        assert!(matches!(back, Value::BigInt(b) if b == big));
    }

    #[tokio::test]
    async fn test_symbol_keeps_description() {
        let back = roundtrip(Primitive::Symbol, Value::symbol(Some("tag"))).await;
        match back {
            Value::Symbol(symbol) => assert_eq!(symbol.description(), Some("tag")),
            other => panic!("expected symbol, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undefined_snapshot_is_json_null() {
        let factory = PrimitiveFactory::new(Primitive::Undefined);
        let snapshot = factory.to_plain(&Value::Undefined).await.unwrap();
        assert!(matches!(snapshot, Snapshot::Value(Value::Null)));
        assert!(factory.from_plain(snapshot).await.unwrap().is_undefined());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_rejected() {
        let factory = PrimitiveFactory::new(Primitive::Boolean);
        assert!(factory.to_plain(&Value::from("true")).await.is_err());
        let factory = PrimitiveFactory::new(Primitive::BigInt);
        assert!(factory
            .from_plain(Snapshot::Value(Value::from("12x")))
            .await
            .is_err());
    }
}

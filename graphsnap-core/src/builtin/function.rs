//! Factory for named callables.

use std::sync::Arc;

use async_trait::async_trait;

use crate::callable::CallableRegistry;
use crate::class::{intrinsic, ClassRef};
use crate::factory::{take_field, Factory, Snapshot};
use crate::value::{ObjectKind, ObjectRef, Value};
use crate::{GraphSnapError, Result};

/// Callables, snapshotted as `{name, isNative, bindings}`.
///
/// Reconstruction resolves `name` in the shared [`CallableRegistry`] and
/// re-attaches the decoded bindings. A binding that refers back to the
/// callable itself is emitted as a ref marker and cannot be rebuilt, since
/// callables have no placeholder.
pub struct FunctionFactory {
    callables: Arc<CallableRegistry>,
}

impl FunctionFactory {
    pub fn new(callables: Arc<CallableRegistry>) -> Self {
        Self { callables }
    }
}

#[async_trait]
impl Factory for FunctionFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::function()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        let callable = match value.as_object().map(ObjectRef::kind_snapshot) {
            Some(ObjectKind::Callable(callable)) => callable,
            _ => {
                return Err(GraphSnapError::invalid_snapshot(
                    self.type_identity().name(),
                    "not a callable",
                ))
            }
        };

        Ok(Snapshot::object([
            ("name", Snapshot::Value(Value::from(callable.name()))),
            ("isNative", Snapshot::Value(Value::Bool(callable.is_native()))),
            ("bindings", Snapshot::values(callable.bindings().to_vec())),
        ]))
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let mut fields = snapshot.into_object(class)?;
        let name = take_field(&mut fields, "name", class)?.into_string(class)?;
        let bindings = match fields.remove("bindings") {
            Some(bindings) => bindings
                .into_array(class)?
                .into_iter()
                .map(|binding| binding.into_value(class))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        self.callables.bind(&name, bindings)
    }
}

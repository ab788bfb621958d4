/*!
The factory port and the snapshot shape it converts to and from.

A factory owns the conversion of one class between its runtime form and a
[`Snapshot`]: a tree of plain arrays and objects whose leaves are values. Leaves
that are themselves heap objects are not converted by the factory; the walkers
encode them recursively so that shared and cyclic references survive.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::class::ClassRef;
use crate::value::{Instance, InstanceState, ObjectKind, Value};
use crate::{GraphSnapError, Result};

/// Plain-data form of a value, as produced by [`Factory::to_plain`].
#[derive(Clone, Debug)]
pub enum Snapshot {
    /// Leaf value; heap objects here are walked as nested nodes
    Value(Value),
    Array(Vec<Snapshot>),
    Object(BTreeMap<String, Snapshot>),
}

impl Snapshot {
    /// Object snapshot from key/snapshot pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Snapshot)>,
    {
        Snapshot::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Array snapshot of leaf values
    pub fn values<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Snapshot::Array(items.into_iter().map(Snapshot::Value).collect())
    }

    /// Object snapshot of leaf values
    pub fn fields<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Snapshot::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Snapshot::Value(v)))
                .collect(),
        )
    }

    /// Short description used in error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Snapshot::Value(Value::Object(_)) => "heap value",
            Snapshot::Value(_) => "primitive",
            Snapshot::Array(_) => "array",
            Snapshot::Object(_) => "object",
        }
    }

    /// Top-level shape check: the snapshot itself must be plain data.
    ///
    /// Heap objects, class tokens and symbols may only appear nested inside an
    /// array or object so that the walker can assign them their own node.
    pub fn validate_top_level(&self, class: &str) -> Result<()> {
        match self {
            Snapshot::Value(Value::Object(_))
            | Snapshot::Value(Value::Class(_))
            | Snapshot::Value(Value::Symbol(_))
            | Snapshot::Value(Value::BigInt(_)) => Err(GraphSnapError::invalid_snapshot(
                class,
                "to_plain must return an object, array or primitive, not a bare instance",
            )),
            _ => Ok(()),
        }
    }

    pub fn into_value(self, class: &str) -> Result<Value> {
        match self {
            Snapshot::Value(value) => Ok(value),
            other => Err(GraphSnapError::invalid_snapshot(
                class,
                format!("expected a value, found {}", other.shape()),
            )),
        }
    }

    pub fn into_array(self, class: &str) -> Result<Vec<Snapshot>> {
        match self {
            Snapshot::Array(items) => Ok(items),
            other => Err(GraphSnapError::invalid_snapshot(
                class,
                format!("expected an array, found {}", other.shape()),
            )),
        }
    }

    pub fn into_object(self, class: &str) -> Result<BTreeMap<String, Snapshot>> {
        match self {
            Snapshot::Object(fields) => Ok(fields),
            other => Err(GraphSnapError::invalid_snapshot(
                class,
                format!("expected an object, found {}", other.shape()),
            )),
        }
    }

    pub fn into_string(self, class: &str) -> Result<String> {
        match self {
            Snapshot::Value(Value::String(s)) => Ok(s),
            other => Err(GraphSnapError::invalid_snapshot(
                class,
                format!("expected a string, found {}", other.shape()),
            )),
        }
    }
}

/// Remove a required field from an object snapshot
pub fn take_field(
    fields: &mut BTreeMap<String, Snapshot>,
    key: &str,
    class: &str,
) -> Result<Snapshot> {
    fields
        .remove(key)
        .ok_or_else(|| GraphSnapError::invalid_snapshot(class, format!("missing field '{key}'")))
}

/// Conversion handler for one class.
///
/// `create_empty` and `update_instance` are only needed for classes whose
/// instances can sit on a cycle. When `create_empty` returns a placeholder, the
/// deserializer hands that placeholder out to back-references and later calls
/// `update_instance` to copy the fully built value into it.
#[async_trait]
pub trait Factory: Send + Sync {
    /// Type identity this factory is registered for
    fn type_identity(&self) -> &ClassRef;

    /// Convert a runtime value into its snapshot
    async fn to_plain(&self, value: &Value) -> Result<Snapshot>;

    /// Build a runtime value from a snapshot whose leaves are already decoded
    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value>;

    /// Empty placeholder for two-phase reconstruction
    fn create_empty(&self) -> Option<Value> {
        None
    }

    /// Copy the state of `real` into `placeholder` without changing its identity
    async fn update_instance(&self, placeholder: &Value, real: Value) -> Result<()> {
        transplant(placeholder, real)
    }
}

/// Move the contents of `real` into `placeholder`.
pub fn transplant(placeholder: &Value, real: Value) -> Result<()> {
    match (placeholder, real) {
        (Value::Object(target), Value::Object(source)) => {
            if target.ptr_eq(&source) {
                return Ok(());
            }
            let contents = source.kind_snapshot();
            target.replace(contents);
            Ok(())
        }
        (_, real) => Err(GraphSnapError::validation(format!(
            "Cannot update a primitive placeholder with {:?}",
            real
        ))),
    }
}

/// Factory for classes whose instances are plain named-field records.
///
/// Cycle safe: placeholders are empty records of the same class.
#[derive(Debug, Clone)]
pub struct RecordFactory {
    class: ClassRef,
}

impl RecordFactory {
    pub fn new(class: &ClassRef) -> Self {
        Self {
            class: class.clone(),
        }
    }

    pub fn shared(class: &ClassRef) -> Arc<dyn Factory> {
        Arc::new(Self::new(class))
    }
}

#[async_trait]
impl Factory for RecordFactory {
    fn type_identity(&self) -> &ClassRef {
        &self.class
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        let object = value
            .as_object()
            .ok_or_else(|| GraphSnapError::invalid_snapshot(self.class.name(), "not an object"))?;
        match object.kind_snapshot() {
            ObjectKind::Instance(Instance {
                state: InstanceState::Record(fields),
                ..
            })
            | ObjectKind::Plain(fields) => Ok(Snapshot::fields(fields)),
            other => Err(GraphSnapError::invalid_snapshot(
                self.class.name(),
                format!("expected a record instance, found {}", other.class().name()),
            )),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let fields = snapshot.into_object(self.class.name())?;
        let fields = fields
            .into_iter()
            .map(|(k, v)| v.into_value(self.class.name()).map(|v| (k, v)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::record(&self.class, fields))
    }

    fn create_empty(&self) -> Option<Value> {
        Some(Value::record(&self.class, Vec::<(String, Value)>::new()))
    }
}

type ToPlainFn = dyn Fn(&Value) -> Result<Snapshot> + Send + Sync;
type FromPlainFn = dyn Fn(Snapshot) -> Result<Value> + Send + Sync;
type CreateEmptyFn = dyn Fn() -> Value + Send + Sync;

/// Factory assembled from closures, for application types that do not need a
/// dedicated `impl Factory`.
pub struct FnFactory {
    class: ClassRef,
    to_plain: Box<ToPlainFn>,
    from_plain: Box<FromPlainFn>,
    create_empty: Option<Box<CreateEmptyFn>>,
}

impl FnFactory {
    pub fn new<T, F>(class: &ClassRef, to_plain: T, from_plain: F) -> Self
    where
        T: Fn(&Value) -> Result<Snapshot> + Send + Sync + 'static,
        F: Fn(Snapshot) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            class: class.clone(),
            to_plain: Box::new(to_plain),
            from_plain: Box::new(from_plain),
            create_empty: None,
        }
    }

    /// Enable placeholders so instances may participate in cycles
    pub fn with_placeholder<E>(mut self, create_empty: E) -> Self
    where
        E: Fn() -> Value + Send + Sync + 'static,
    {
        self.create_empty = Some(Box::new(create_empty));
        self
    }

    pub fn into_shared(self) -> Arc<dyn Factory> {
        Arc::new(self)
    }
}

#[async_trait]
impl Factory for FnFactory {
    fn type_identity(&self) -> &ClassRef {
        &self.class
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        (self.to_plain)(value)
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        (self.from_plain)(snapshot)
    }

    fn create_empty(&self) -> Option<Value> {
        self.create_empty.as_ref().map(|create| create())
    }
}

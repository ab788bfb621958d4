//! Container factories: plain objects, arrays, maps and sets.
//!
//! All four are cycle safe. Snapshots are shallow: member values are left as
//! snapshot leaves for the walker to encode.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::class::{intrinsic, ClassRef};
use crate::factory::{Factory, Snapshot};
use crate::value::{ObjectKind, ObjectRef, Value};
use crate::{GraphSnapError, Result};

fn expect_kind(value: &Value, class: &ClassRef) -> Result<ObjectKind> {
    value
        .as_object()
        .map(ObjectRef::kind_snapshot)
        .ok_or_else(|| GraphSnapError::invalid_snapshot(class.name(), "not a heap object"))
}

fn unexpected(class: &ClassRef, kind: &ObjectKind) -> GraphSnapError {
    GraphSnapError::invalid_snapshot(
        class.name(),
        format!("cannot convert a {} value", kind.class().name()),
    )
}

fn leaves(items: Vec<Snapshot>, class: &ClassRef) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|item| item.into_value(class.name()))
        .collect()
}

/// Plain string-keyed objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectFactory;

impl ObjectFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for ObjectFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::object()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match expect_kind(value, self.type_identity())? {
            ObjectKind::Plain(fields) => Ok(Snapshot::fields(fields)),
            other => Err(unexpected(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity();
        let mut fields = BTreeMap::new();
        for (key, entry) in snapshot.into_object(class.name())? {
            fields.insert(key, entry.into_value(class.name())?);
        }
        Ok(Value::Object(ObjectRef::new(ObjectKind::Plain(fields))))
    }

    fn create_empty(&self) -> Option<Value> {
        Some(Value::empty_object())
    }
}

/// Arrays.
#[derive(Debug, Clone, Default)]
pub struct ArrayFactory;

impl ArrayFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for ArrayFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::array()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match expect_kind(value, self.type_identity())? {
            ObjectKind::Array(items) => Ok(Snapshot::values(items)),
            other => Err(unexpected(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity();
        let items = leaves(snapshot.into_array(class.name())?, class)?;
        Ok(Value::array(items))
    }

    fn create_empty(&self) -> Option<Value> {
        Some(Value::array([]))
    }
}

/// Maps, snapshotted as an array of `[key, value]` pairs in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MapFactory;

impl MapFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for MapFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::map()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match expect_kind(value, self.type_identity())? {
            ObjectKind::Map(entries) => Ok(Snapshot::Array(
                entries
                    .into_iter()
                    .map(|(k, v)| Snapshot::values([k, v]))
                    .collect(),
            )),
            other => Err(unexpected(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity();
        let mut entries = Vec::new();
        for pair in snapshot.into_array(class.name())? {
            let mut pair = leaves(pair.into_array(class.name())?, class)?;
            if pair.len() != 2 {
                return Err(GraphSnapError::invalid_snapshot(
                    class.name(),
                    format!("map entry has {} elements, expected 2", pair.len()),
                ));
            }
            let value = pair.pop().unwrap_or(Value::Undefined);
            let key = pair.pop().unwrap_or(Value::Undefined);
            entries.push((key, value));
        }
        Ok(Value::map(entries))
    }

    fn create_empty(&self) -> Option<Value> {
        Some(Value::map([]))
    }
}

/// Sets, snapshotted as an array of members.
#[derive(Debug, Clone, Default)]
pub struct SetFactory;

impl SetFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for SetFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::set()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match expect_kind(value, self.type_identity())? {
            ObjectKind::Set(members) => Ok(Snapshot::values(members)),
            other => Err(unexpected(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity();
        let members = leaves(snapshot.into_array(class.name())?, class)?;
        Ok(Value::set(members))
    }

    fn create_empty(&self) -> Option<Value> {
        Some(Value::set([]))
    }
}

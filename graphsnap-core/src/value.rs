/*!
Runtime value model walked by the serializer.

[`Value`] is a cheap-to-clone handle. Primitives compare by value; symbols,
class tokens and heap objects carry an identity, so two fields holding clones
of the same [`ObjectRef`] point at one shared object. Heap objects use interior
mutability so a graph can be cyclic and so a deserialization placeholder can be
filled in place after it has been handed out.
*/

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::callable::Callable;
use crate::class::{intrinsic, ClassRef};
use crate::{GraphSnapError, Result};

/// A dynamically typed value in an object graph.
#[derive(Clone, Debug)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Symbol(Symbol),
    /// A class token passed around as data
    Class(ClassRef),
    Object(ObjectRef),
}

/// A unique symbol with an optional description.
#[derive(Clone)]
pub struct Symbol(Arc<Option<String>>);

impl Symbol {
    pub fn new(description: Option<String>) -> Self {
        Self(Arc::new(description))
    }

    pub fn description(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn ptr_eq(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

/// Handle to a heap object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<ObjectKind>>);

impl ObjectRef {
    pub fn new(kind: ObjectKind) -> Self {
        Self(Arc::new(RwLock::new(kind)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ObjectKind> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ObjectKind> {
        self.0.write()
    }

    /// Shallow copy of the object's current contents
    pub fn kind_snapshot(&self) -> ObjectKind {
        self.read().clone()
    }

    /// Replace the contents in place, keeping the identity
    pub fn replace(&self, kind: ObjectKind) -> ObjectKind {
        std::mem::replace(&mut *self.write(), kind)
    }

    pub fn class(&self) -> ClassRef {
        self.read().class()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Drop for ObjectRef {
    // The last handle unlinks its children into a work list, so dropping a long
    // chain of objects runs in a loop instead of one stack frame per link.
    fn drop(&mut self) {
        if Arc::strong_count(&self.0) != 1 {
            return;
        }
        let mut pending = Vec::new();
        if let Some(mut kind) = self.0.try_write() {
            kind.take_children(&mut pending);
        }
        while let Some(value) = pending.pop() {
            if let Value::Object(child) = value {
                if Arc::strong_count(&child.0) == 1 {
                    if let Some(mut kind) = child.0.try_write() {
                        kind.take_children(&mut pending);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.class().name(), self.addr())
    }
}

/// Contents of a heap object.
#[derive(Clone, Debug)]
pub enum ObjectKind {
    Plain(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Date(DateTime<Utc>),
    RegExp(RegExp),
    Error(ErrorValue),
    Bytes(Bytes),
    AbortController(AbortState),
    Task(TaskState),
    Callable(Callable),
    Instance(Instance),
}

impl ObjectKind {
    pub fn class(&self) -> ClassRef {
        match self {
            Self::Plain(_) => intrinsic::object().clone(),
            Self::Array(_) => intrinsic::array().clone(),
            Self::Map(_) => intrinsic::map().clone(),
            Self::Set(_) => intrinsic::set().clone(),
            Self::Date(_) => intrinsic::date().clone(),
            Self::RegExp(_) => intrinsic::regexp().clone(),
            Self::Error(_) => intrinsic::error().clone(),
            Self::Bytes(_) => intrinsic::bytes().clone(),
            Self::AbortController(_) => intrinsic::abort_controller().clone(),
            Self::Task(_) => intrinsic::task().clone(),
            Self::Callable(_) => intrinsic::function().clone(),
            Self::Instance(instance) => instance.class.clone(),
        }
    }

    /// Move every value held by this object into `into`
    fn take_children(&mut self, into: &mut Vec<Value>) {
        match self {
            Self::Plain(fields)
            | Self::Instance(Instance {
                state: InstanceState::Record(fields),
                ..
            }) => into.extend(std::mem::take(fields).into_values()),
            Self::Array(items) | Self::Set(items) => into.append(items),
            Self::Map(entries) => {
                for (key, value) in entries.drain(..) {
                    into.push(key);
                    into.push(value);
                }
            }
            Self::Error(error) => into.extend(error.cause.take()),
            Self::AbortController(state) => {
                into.push(std::mem::replace(&mut state.reason, Value::Undefined))
            }
            Self::Task(TaskState::Fulfilled(value) | TaskState::Rejected(value)) => {
                into.push(std::mem::replace(value, Value::Undefined))
            }
            _ => {}
        }
    }
}

/// A regular expression kept as its source text and flag letters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegExp {
    pub source: String,
    pub flags: String,
}

impl RegExp {
    pub fn new<S: Into<String>, F: Into<String>>(source: S, flags: F) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }

    /// Compile into a [`regex::Regex`], mapping the `i`, `m`, `s` and `x` flags
    /// to inline flags. Other flag letters only affect matching iteration and
    /// are ignored.
    pub fn compile(&self) -> Result<regex::Regex> {
        let inline: String = self
            .flags
            .chars()
            .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
            .collect();
        let pattern = if inline.is_empty() {
            self.source.clone()
        } else {
            format!("(?{inline}){}", self.source)
        };
        regex::Regex::new(&pattern)
            .map_err(|e| GraphSnapError::validation(format!("Invalid regular expression: {e}")))
    }
}

/// Structured error value.
#[derive(Clone, Debug)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub cause: Option<Value>,
}

/// State of an abort controller.
#[derive(Clone, Debug)]
pub struct AbortState {
    pub aborted: bool,
    pub reason: Value,
}

/// State of a deferred task.
#[derive(Clone, Debug)]
pub enum TaskState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// Instance of an application class.
#[derive(Clone, Debug)]
pub struct Instance {
    pub class: ClassRef,
    pub state: InstanceState,
}

/// Payload of an [`Instance`].
#[derive(Clone)]
pub enum InstanceState {
    /// Dynamic named fields
    Record(BTreeMap<String, Value>),
    /// Opaque Rust value, converted by the class's own factory
    Native(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

impl Value {
    /// Plain object from key/value pairs
    pub fn object_from<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let fields = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Object(ObjectRef::new(ObjectKind::Plain(fields)))
    }

    /// Empty plain object
    pub fn empty_object() -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Plain(BTreeMap::new())))
    }

    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Array(items.into_iter().collect())))
    }

    pub fn map<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Map(entries.into_iter().collect())))
    }

    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Value {
        let mut members: Vec<Value> = Vec::new();
        for item in items {
            if !members.iter().any(|m| m.same_identity(&item)) {
                members.push(item);
            }
        }
        Value::Object(ObjectRef::new(ObjectKind::Set(members)))
    }

    pub fn date(at: DateTime<Utc>) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Date(at)))
    }

    pub fn regexp<S: Into<String>, F: Into<String>>(source: S, flags: F) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::RegExp(RegExp::new(source, flags))))
    }

    pub fn error<N: Into<String>, M: Into<String>>(name: N, message: M) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Error(ErrorValue {
            name: name.into(),
            message: message.into(),
            stack: None,
            cause: None,
        })))
    }

    pub fn error_with(error: ErrorValue) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Error(error)))
    }

    pub fn bytes<B: Into<Bytes>>(data: B) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Bytes(data.into())))
    }

    /// Fresh, non-aborted controller
    pub fn abort_controller() -> Value {
        Value::Object(ObjectRef::new(ObjectKind::AbortController(AbortState {
            aborted: false,
            reason: Value::Undefined,
        })))
    }

    pub fn pending_task() -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Task(TaskState::Pending)))
    }

    pub fn resolved_task(value: Value) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Task(TaskState::Fulfilled(value))))
    }

    pub fn rejected_task(reason: Value) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Task(TaskState::Rejected(reason))))
    }

    pub fn callable(callable: Callable) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Callable(callable)))
    }

    /// Record instance of `class`
    pub fn record<K, I>(class: &ClassRef, fields: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Object(ObjectRef::new(ObjectKind::Instance(Instance {
            class: class.clone(),
            state: InstanceState::Record(fields),
        })))
    }

    /// Instance of `class` wrapping an opaque Rust value
    pub fn native<T: Any + Send + Sync>(class: &ClassRef, data: T) -> Value {
        Value::Object(ObjectRef::new(ObjectKind::Instance(Instance {
            class: class.clone(),
            state: InstanceState::Native(Arc::new(data)),
        })))
    }

    pub fn symbol(description: Option<&str>) -> Value {
        Value::Symbol(Symbol::new(description.map(str::to_string)))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Primitives that have a direct JSON form and are emitted inline
    pub fn is_json_primitive(&self) -> bool {
        match self {
            Value::Null | Value::Bool(_) | Value::String(_) => true,
            Value::Number(n) => n.is_finite(),
            _ => false,
        }
    }

    /// Address of the shared allocation for values that carry an identity
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Object(object) => Some(object.addr()),
            Value::Symbol(symbol) => Some(Arc::as_ptr(&symbol.0) as usize),
            Value::Class(class) => Some(class.addr()),
            _ => None,
        }
    }

    /// Strict equality: primitives by value, everything else by identity
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a.ptr_eq(b),
            (Value::Class(a), Value::Class(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Field of a plain object or record instance
    pub fn get(&self, key: &str) -> Option<Value> {
        let object = self.as_object()?;
        let guard = object.read();
        match &*guard {
            ObjectKind::Plain(fields) => fields.get(key).cloned(),
            ObjectKind::Instance(Instance {
                state: InstanceState::Record(fields),
                ..
            }) => fields.get(key).cloned(),
            _ => None,
        }
    }

    /// Set a field on a plain object or record instance
    pub fn set_field<K: Into<String>>(&self, key: K, value: Value) -> Result<()> {
        let object = self
            .as_object()
            .ok_or_else(|| GraphSnapError::validation("Cannot set a field on a primitive"))?;
        let mut guard = object.write();
        match &mut *guard {
            ObjectKind::Plain(fields)
            | ObjectKind::Instance(Instance {
                state: InstanceState::Record(fields),
                ..
            }) => {
                fields.insert(key.into(), value);
                Ok(())
            }
            other => Err(GraphSnapError::validation(format!(
                "Cannot set a field on a {} value",
                other.class().name()
            ))),
        }
    }

    /// Element of an array
    pub fn at(&self, index: usize) -> Option<Value> {
        let object = self.as_object()?;
        let guard = object.read();
        match &*guard {
            ObjectKind::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Append to an array
    pub fn push(&self, value: Value) -> Result<()> {
        let object = self
            .as_object()
            .ok_or_else(|| GraphSnapError::validation("Cannot push onto a primitive"))?;
        match &mut *object.write() {
            ObjectKind::Array(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(GraphSnapError::validation(format!(
                "Cannot push onto a {} value",
                other.class().name()
            ))),
        }
    }

    /// Number of elements, entries or fields, where that makes sense
    pub fn len(&self) -> Option<usize> {
        let object = self.as_object()?;
        let guard = object.read();
        match &*guard {
            ObjectKind::Plain(fields) => Some(fields.len()),
            ObjectKind::Array(items) | ObjectKind::Set(items) => Some(items.len()),
            ObjectKind::Map(entries) => Some(entries.len()),
            ObjectKind::Bytes(data) => Some(data.len()),
            _ => None,
        }
    }

    /// Look up a map entry by key identity
    pub fn map_get(&self, key: &Value) -> Option<Value> {
        let object = self.as_object()?;
        let guard = object.read();
        match &*guard {
            ObjectKind::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.same_identity(key))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Invoke a callable value
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let callable = match self.as_object().map(ObjectRef::kind_snapshot) {
            Some(ObjectKind::Callable(callable)) => callable,
            _ => return Err(GraphSnapError::validation("Value is not callable")),
        };
        callable.invoke(args)
    }

    /// Mark an abort controller as aborted
    pub fn abort(&self, reason: Value) -> Result<()> {
        let object = self
            .as_object()
            .ok_or_else(|| GraphSnapError::validation("Value is not an abort controller"))?;
        match &mut *object.write() {
            ObjectKind::AbortController(state) => {
                if !state.aborted {
                    state.aborted = true;
                    state.reason = reason;
                }
                Ok(())
            }
            _ => Err(GraphSnapError::validation("Value is not an abort controller")),
        }
    }

    /// Settle a pending task; settling twice keeps the first outcome
    pub fn settle(&self, outcome: std::result::Result<Value, Value>) -> Result<()> {
        let object = self
            .as_object()
            .ok_or_else(|| GraphSnapError::validation("Value is not a task"))?;
        match &mut *object.write() {
            ObjectKind::Task(state) => {
                if matches!(state, TaskState::Pending) {
                    *state = match outcome {
                        Ok(value) => TaskState::Fulfilled(value),
                        Err(reason) => TaskState::Rejected(reason),
                    };
                }
                Ok(())
            }
            _ => Err(GraphSnapError::validation("Value is not a task")),
        }
    }

    /// Structural equality that terminates on cyclic graphs.
    ///
    /// Symbols compare by description, class tokens and native instance payloads
    /// by identity.
    pub fn deep_equals(&self, other: &Value) -> bool {
        let mut assumed = HashSet::new();
        deep_eq(self, other, &mut assumed)
    }
}

fn deep_eq(a: &Value, b: &Value, assumed: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Symbol(x), Value::Symbol(y)) => x.description() == y.description(),
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) || !assumed.insert((x.addr(), y.addr())) {
                return true;
            }
            let (left, right) = (x.kind_snapshot(), y.kind_snapshot());
            deep_eq_kind(&left, &right, assumed)
        }
        _ => a.same_identity(b),
    }
}

fn deep_eq_all(a: &[Value], b: &[Value], assumed: &mut HashSet<(usize, usize)>) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_eq(x, y, assumed))
}

fn deep_eq_fields(
    a: &BTreeMap<String, Value>,
    b: &BTreeMap<String, Value>,
    assumed: &mut HashSet<(usize, usize)>,
) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|((ka, va), (kb, vb))| ka == kb && deep_eq(va, vb, assumed))
}

fn deep_eq_kind(a: &ObjectKind, b: &ObjectKind, assumed: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (ObjectKind::Plain(x), ObjectKind::Plain(y)) => deep_eq_fields(x, y, assumed),
        (ObjectKind::Array(x), ObjectKind::Array(y)) | (ObjectKind::Set(x), ObjectKind::Set(y)) => {
            deep_eq_all(x, y, assumed)
        }
        (ObjectKind::Map(x), ObjectKind::Map(y)) => {
            x.len() == y.len()
                && x.iter().zip(y).all(|((kx, vx), (ky, vy))| {
                    deep_eq(kx, ky, assumed) && deep_eq(vx, vy, assumed)
                })
        }
        (ObjectKind::Date(x), ObjectKind::Date(y)) => x == y,
        (ObjectKind::RegExp(x), ObjectKind::RegExp(y)) => x == y,
        (ObjectKind::Bytes(x), ObjectKind::Bytes(y)) => x == y,
        (ObjectKind::Error(x), ObjectKind::Error(y)) => {
            x.name == y.name
                && x.message == y.message
                && x.stack == y.stack
                && match (&x.cause, &y.cause) {
                    (Some(cx), Some(cy)) => deep_eq(cx, cy, assumed),
                    (None, None) => true,
                    _ => false,
                }
        }
        (ObjectKind::AbortController(x), ObjectKind::AbortController(y)) => {
            x.aborted == y.aborted && deep_eq(&x.reason, &y.reason, assumed)
        }
        (ObjectKind::Task(x), ObjectKind::Task(y)) => match (x, y) {
            (TaskState::Pending, TaskState::Pending) => true,
            (TaskState::Fulfilled(vx), TaskState::Fulfilled(vy))
            | (TaskState::Rejected(vx), TaskState::Rejected(vy)) => deep_eq(vx, vy, assumed),
            _ => false,
        },
        (ObjectKind::Callable(x), ObjectKind::Callable(y)) => {
            x.name() == y.name()
                && x.is_native() == y.is_native()
                && deep_eq_all(x.bindings(), y.bindings(), assumed)
        }
        (ObjectKind::Instance(x), ObjectKind::Instance(y)) => {
            x.class.ptr_eq(&y.class)
                && match (&x.state, &y.state) {
                    (InstanceState::Record(fx), InstanceState::Record(fy)) => {
                        deep_eq_fields(fx, fy, assumed)
                    }
                    (InstanceState::Native(nx), InstanceState::Native(ny)) => Arc::ptr_eq(nx, ny),
                    _ => false,
                }
        }
        _ => false,
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ClassRef> for Value {
    fn from(value: ClassRef) -> Self {
        Value::Class(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_identity() {
        let a = Value::object_from([("name", Value::from("A"))]);
        let alias = a.clone();
        let copy = Value::object_from([("name", Value::from("A"))]);

        assert!(a.same_identity(&alias));
        assert!(!a.same_identity(&copy));
        assert!(a.deep_equals(&copy));
    }

    #[test]
    fn test_long_chain_drops_without_recursion() {
        let mut head = Value::Null;
        for i in 0..200_000 {
            head = Value::object_from([("i", Value::from(i)), ("prev", head)]);
        }
        let tail_items = Value::array([head.clone()]);
        drop(head);
        assert!(tail_items.at(0).is_some());
        drop(tail_items);
    }

    #[test]
    fn test_mutation_is_visible_through_aliases() {
        let a = Value::empty_object();
        let alias = a.clone();
        a.set_field("k", Value::from(1)).unwrap();
        assert_eq!(alias.get("k").and_then(|v| v.as_f64()), Some(1.0));
    }

    #[test]
    fn test_deep_equals_terminates_on_cycles() {
        let a = Value::empty_object();
        a.set_field("self", a.clone()).unwrap();
        let b = Value::empty_object();
        b.set_field("self", b.clone()).unwrap();

        assert!(a.deep_equals(&b));

        b.set_field("extra", Value::Null).unwrap();
        assert!(!a.deep_equals(&b));
    }

    #[test]
    fn test_nan_deep_equals_itself() {
        assert!(Value::Number(f64::NAN).deep_equals(&Value::Number(f64::NAN)));
        assert!(!Value::Number(f64::NAN).same_identity(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_set_deduplicates_by_identity() {
        let shared = Value::empty_object();
        let set = Value::set([shared.clone(), shared, Value::from(1), Value::from(1)]);
        assert_eq!(set.len(), Some(2));
    }

    #[test]
    fn test_regexp_compile_maps_flags() {
        let re = RegExp::new("^agent", "gi").compile().unwrap();
        assert!(re.is_match("AGENT smith"));
        assert!(RegExp::new("(", "").compile().is_err());
    }

    #[test]
    fn test_settle_keeps_first_outcome() {
        let task = Value::pending_task();
        task.settle(Ok(Value::from("done"))).unwrap();
        task.settle(Err(Value::from("late"))).unwrap();
        assert!(task.deep_equals(&Value::resolved_task(Value::from("done"))));
    }

    #[test]
    fn test_abort_records_reason_once() {
        let controller = Value::abort_controller();
        controller.abort(Value::from("stop")).unwrap();
        controller.abort(Value::from("again")).unwrap();
        match controller.as_object().unwrap().kind_snapshot() {
            ObjectKind::AbortController(state) => {
                assert!(state.aborted);
                assert_eq!(state.reason.as_str(), Some("stop"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
}

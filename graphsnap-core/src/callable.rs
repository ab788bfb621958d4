/*!
Named callables and the callable registry.

Callables cannot be rebuilt from source text in a compiled program, so a
serializable callable is a symbolic name plus the plain-data values it has
captured. Reconstruction looks the name up in a [`CallableRegistry`] and
re-attaches the decoded bindings.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::value::{ObjectKind, Value};
use crate::{GraphSnapError, Result};

/// Body of a callable: `(bindings, args) -> result`.
pub type CallableFn = Arc<dyn Fn(&[Value], &[Value]) -> Result<Value> + Send + Sync>;

/// A named callable with captured bindings.
#[derive(Clone)]
pub struct Callable {
    name: String,
    native: bool,
    bindings: Vec<Value>,
    body: CallableFn,
}

impl Callable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native callables belong to the fixed built-in namespace
    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn bindings(&self) -> &[Value] {
        &self.bindings
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.body)(&self.bindings, args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("native", &self.native)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    native: bool,
    body: CallableFn,
}

/// Name → callable body lookup used to reconstruct callables.
pub struct CallableRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for CallableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallableRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-seeded with the native namespace
    pub fn with_natives() -> Self {
        let registry = Self::new();
        for (name, body) in natives() {
            registry.entries.write().insert(
                name.to_string(),
                Entry { native: true, body },
            );
        }
        registry
    }

    /// Register a callable body under `name`.
    ///
    /// Registering the same body twice is a no-op; a different body under an
    /// existing name is a conflict.
    pub fn register<S, F>(&self, name: S, body: F) -> Result<CallableFn>
    where
        S: Into<String>,
        F: Fn(&[Value], &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let body: CallableFn = Arc::new(body);
        self.register_shared(name, body.clone())?;
        Ok(body)
    }

    /// Register an already shared body
    pub fn register_shared<S: Into<String>>(&self, name: S, body: CallableFn) -> Result<()> {
        let name = name.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&name) {
            if Arc::ptr_eq(&existing.body, &body) {
                return Ok(());
            }
            return Err(GraphSnapError::RegistryConflict { name });
        }
        debug!("Registered callable '{}'", name);
        entries.insert(name, Entry { native: false, body });
        Ok(())
    }

    pub fn deregister(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Build a callable from a registered name and captured bindings
    pub fn resolve(&self, name: &str, bindings: Vec<Value>) -> Result<Callable> {
        let entry = self
            .entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GraphSnapError::UnknownCallable(name.to_string()))?;
        Ok(Callable {
            name: name.to_string(),
            native: entry.native,
            bindings,
            body: entry.body,
        })
    }

    /// Convenience for `Value::callable(self.resolve(..)?)`
    pub fn bind(&self, name: &str, bindings: Vec<Value>) -> Result<Value> {
        Ok(Value::callable(self.resolve(name, bindings)?))
    }
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    match args.get(index) {
        Some(value) => to_number(value),
        None => f64::NAN,
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::BigInt(i) => *i as f64,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

fn to_display(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
        Value::Number(n) => n.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::String(s) => s.clone(),
        Value::Symbol(s) => format!("Symbol({})", s.description().unwrap_or("")),
        Value::Class(c) => format!("class {}", c.name()),
        Value::Object(o) => format!("[object {}]", o.class().name()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::BigInt(i) => *i != 0,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn native<F>(body: F) -> CallableFn
where
    F: Fn(&[Value], &[Value]) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(body)
}

fn natives() -> Vec<(&'static str, CallableFn)> {
    vec![
        (
            "Math.max",
            native(|_, args| {
                Ok(Value::Number(args.iter().map(to_number).fold(
                    f64::NEG_INFINITY,
                    |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) },
                )))
            }),
        ),
        (
            "Math.min",
            native(|_, args| {
                Ok(Value::Number(args.iter().map(to_number).fold(
                    f64::INFINITY,
                    |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) },
                )))
            }),
        ),
        (
            "Math.abs",
            native(|_, args| Ok(Value::Number(number_arg(args, 0).abs()))),
        ),
        (
            "Math.floor",
            native(|_, args| Ok(Value::Number(number_arg(args, 0).floor()))),
        ),
        (
            "String",
            native(|_, args| {
                Ok(Value::String(args.first().map(to_display).unwrap_or_default()))
            }),
        ),
        (
            "Number",
            native(|_, args| {
                Ok(Value::Number(args.first().map(to_number).unwrap_or(0.0)))
            }),
        ),
        (
            "Boolean",
            native(|_, args| {
                Ok(Value::Bool(args.first().map(truthy).unwrap_or(false)))
            }),
        ),
        (
            "Array.isArray",
            native(|_, args| {
                let is_array = args.first().and_then(Value::as_object).map(|o| {
                    matches!(&*o.read(), ObjectKind::Array(_))
                });
                Ok(Value::Bool(is_array.unwrap_or(false)))
            }),
        ),
    ]
}

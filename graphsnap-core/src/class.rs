/*!
Class identities and the deterministic class-name resolver.

A [`ClassRef`] is the type identity token of the object model: two handles are
the same class only if they point at the same allocation. The parent link plays
the part of a prototype chain when the registry looks for a factory that can
handle a subclass.
*/

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::value::Value;

/// Pseudo-type names used to route primitives through the factory registry.
pub mod pseudo {
    pub const STRING: &str = "string";
    pub const NUMBER: &str = "number";
    pub const BIGINT: &str = "bigint";
    pub const BOOLEAN: &str = "boolean";
    pub const SYMBOL: &str = "symbol";
    pub const UNDEFINED: &str = "undefined";
    pub const NULL: &str = "null";
    /// Plain string-keyed objects; also the universal root of every parent chain
    pub const OBJECT: &str = "Object";
    /// Callables of any shape
    pub const FUNCTION: &str = "Function";
}

struct Class {
    name: String,
    parent: Option<ClassRef>,
    auto_serializable: bool,
}

/// Shared handle to a class identity.
#[derive(Clone)]
pub struct ClassRef(Arc<Class>);

impl ClassRef {
    /// Create a new root class with the given display name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(Arc::new(Class {
            name: name.into(),
            parent: None,
            auto_serializable: false,
        }))
    }

    /// Create a subclass of `parent`
    pub fn extends<S: Into<String>>(name: S, parent: &ClassRef) -> Self {
        Self(Arc::new(Class {
            name: name.into(),
            parent: Some(parent.clone()),
            auto_serializable: false,
        }))
    }

    /// Create a class whose instances get a record factory registered lazily
    /// the first time one is serialized.
    pub fn auto_serializable<S: Into<String>>(name: S) -> Self {
        Self(Arc::new(Class {
            name: name.into(),
            parent: None,
            auto_serializable: true,
        }))
    }

    /// Display name; not necessarily unique, see [`ClassResolver`]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&ClassRef> {
        self.0.parent.as_ref()
    }

    pub fn is_auto_serializable(&self) -> bool {
        self.0.auto_serializable
    }

    /// Iterate over the parent chain, nearest ancestor first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.parent(),
        }
    }

    pub fn ptr_eq(&self, other: &ClassRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.name())
    }
}

/// Iterator over a class's ancestors.
pub struct Ancestors<'a> {
    next: Option<&'a ClassRef>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ClassRef;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

macro_rules! intrinsic_classes {
    ($($(#[$doc:meta])* $fn_name:ident => $name:expr;)*) => {
        /// Type identities of the built-in value kinds.
        pub mod intrinsic {
            use super::*;

            $(
                $(#[$doc])*
                pub fn $fn_name() -> &'static ClassRef {
                    static CLASS: Lazy<ClassRef> = Lazy::new(|| ClassRef::new($name));
                    &CLASS
                }
            )*
        }
    };
}

intrinsic_classes! {
    object => pseudo::OBJECT;
    array => "Array";
    map => "Map";
    set => "Set";
    date => "Date";
    regexp => "RegExp";
    error => "Error";
    bytes => "Buffer";
    abort_controller => "AbortController";
    /// Deferred values
    task => "Task";
    function => pseudo::FUNCTION;
    string => pseudo::STRING;
    number => pseudo::NUMBER;
    bigint => pseudo::BIGINT;
    boolean => pseudo::BOOLEAN;
    symbol => pseudo::SYMBOL;
    undefined => pseudo::UNDEFINED;
    null => pseudo::NULL;
}

/// Assigns stable, collision-free names to classes.
///
/// The first class seen with a display name keeps it; later distinct classes
/// sharing that name become `Name#1`, `Name#2`, ... The assignment is memoized
/// per class for the lifetime of the resolver.
#[derive(Debug, Default)]
pub struct ClassResolver {
    names: HashMap<ClassRef, String>,
    assigned: HashSet<String>,
    next_index: HashMap<String, usize>,
}

impl ClassResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the registry name of a class
    pub fn name_of(&mut self, class: &ClassRef) -> String {
        if let Some(name) = self.names.get(class) {
            return name.clone();
        }

        let base = class.name();
        let mut candidate = base.to_string();
        while self.assigned.contains(&candidate) {
            let index = self.next_index.entry(base.to_string()).or_insert(0);
            *index += 1;
            candidate = format!("{base}#{index}");
        }

        self.assigned.insert(candidate.clone());
        self.names.insert(class.clone(), candidate.clone());
        candidate
    }

    /// Resolve the registry name for any value, using pseudo-type names for primitives
    pub fn name_of_value(&mut self, value: &Value) -> String {
        match value {
            Value::Undefined => pseudo::UNDEFINED.to_string(),
            Value::Null => pseudo::NULL.to_string(),
            Value::Bool(_) => pseudo::BOOLEAN.to_string(),
            Value::Number(_) => pseudo::NUMBER.to_string(),
            Value::BigInt(_) => pseudo::BIGINT.to_string(),
            Value::String(_) => pseudo::STRING.to_string(),
            Value::Symbol(_) => pseudo::SYMBOL.to_string(),
            Value::Class(class) => self.name_of(class),
            Value::Object(object) => self.name_of(&object.class()),
        }
    }

    /// Returns the memoized name of a class without assigning one
    pub fn peek(&self, class: &ClassRef) -> Option<&str> {
        self.names.get(class).map(String::as_str)
    }

    /// Forget the name assigned to `class` and make it available again
    pub fn release(&mut self, class: &ClassRef) -> Option<String> {
        let name = self.names.remove(class)?;
        self.assigned.remove(&name);
        Some(name)
    }
}

/*!
Factory registry: resolved class name → factory, plus aliases.

The registry is an explicit value owned by the host application and shared by
reference (or `Arc`) with every serializer that needs it. Registration is
expected during setup; lookups take read locks only and never hold them across
an `await`.
*/

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::builtin::{self, BuiltinOptions};
use crate::callable::CallableRegistry;
use crate::class::{intrinsic, pseudo, ClassRef, ClassResolver};
use crate::factory::{Factory, RecordFactory};
use crate::value::{ObjectKind, Value};
use crate::{GraphSnapError, Result};

/// Result of [`FactoryRegistry::find_factory`].
#[derive(Clone)]
pub struct FactoryMatch {
    /// Registry name the value is tagged with
    pub name: String,
    pub factory: Arc<dyn Factory>,
    /// The value is the factory's own type identity, not an instance of it
    pub is_self_ref: bool,
}

/// Registry of conversion factories.
pub struct FactoryRegistry {
    factories: RwLock<HashMap<String, Arc<dyn Factory>>>,
    aliases: RwLock<HashMap<String, Arc<dyn Factory>>>,
    resolver: Mutex<ClassResolver>,
    callables: Arc<CallableRegistry>,
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryRegistry {
    /// Registry with no factories and an empty callable registry
    pub fn new() -> Self {
        Self::with_callables(Arc::new(CallableRegistry::new()))
    }

    /// Registry with no factories sharing the given callable registry
    pub fn with_callables(callables: Arc<CallableRegistry>) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            resolver: Mutex::new(ClassResolver::new()),
            callables,
        }
    }

    /// Registry with every built-in factory and the native callables
    pub fn with_builtins() -> Result<Self> {
        Self::with_builtin_options(&BuiltinOptions::default())
    }

    /// Registry with every built-in factory, configured by `options`
    pub fn with_builtin_options(options: &BuiltinOptions) -> Result<Self> {
        let registry = Self::with_callables(Arc::new(CallableRegistry::with_natives()));
        builtin::register_builtins(&registry, options)?;
        Ok(registry)
    }

    /// Callable registry used by the `Function` factory
    pub fn callables(&self) -> &Arc<CallableRegistry> {
        &self.callables
    }

    /// Register a factory under its type's resolved name and any aliases.
    ///
    /// Re-registering the same type identity is a no-op. A different type
    /// under an existing name or alias is a [`GraphSnapError::RegistryConflict`];
    /// nothing is stored in that case.
    pub fn register(&self, factory: Arc<dyn Factory>, aliases: &[&str]) -> Result<()> {
        let identity = factory.type_identity().clone();
        let name = self.resolver.lock().name_of(&identity);

        let mut factories = self.factories.write();
        let mut alias_table = self.aliases.write();

        if let Some(existing) = factories.get(&name) {
            if !existing.type_identity().ptr_eq(&identity) {
                return Err(GraphSnapError::RegistryConflict { name });
            }
        }
        for alias in aliases {
            let bound = alias_table.get(*alias).or_else(|| factories.get(*alias));
            if let Some(existing) = bound {
                if !existing.type_identity().ptr_eq(&identity) {
                    return Err(GraphSnapError::RegistryConflict {
                        name: alias.to_string(),
                    });
                }
            }
        }

        if !factories.contains_key(&name) {
            debug!("Registered factory '{}'", name);
            factories.insert(name.clone(), factory.clone());
        }
        for alias in aliases {
            if *alias != name && !alias_table.contains_key(*alias) {
                debug!("Registered alias '{}' for '{}'", alias, name);
                alias_table.insert(alias.to_string(), factory.clone());
            }
        }
        Ok(())
    }

    /// Remove the factory registered for `class` and every alias pointing at it.
    ///
    /// The class's resolved name is released as well, so a reloaded class with
    /// the same display name takes the name back and reads existing text.
    /// Returns `true` when a name-keyed entry was removed.
    pub fn deregister(&self, class: &ClassRef) -> bool {
        let mut resolver = self.resolver.lock();
        let Some(name) = resolver.peek(class).map(str::to_string) else {
            return false;
        };

        let mut factories = self.factories.write();
        let removed = factories
            .get(&name)
            .is_some_and(|existing| existing.type_identity().ptr_eq(class));
        if removed {
            factories.remove(&name);
        }
        if removed || !factories.contains_key(&name) {
            resolver.release(class);
        }
        self.aliases
            .write()
            .retain(|_, factory| !factory.type_identity().ptr_eq(class));

        if removed {
            debug!("Deregistered factory '{}'", name);
        }
        removed
    }

    /// Look up a factory by registry name or alias
    pub fn get_factory(&self, name: &str) -> Result<Arc<dyn Factory>> {
        if let Some(factory) = self.factories.read().get(name) {
            return Ok(factory.clone());
        }
        self.aliases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GraphSnapError::UnknownClass(name.to_string()))
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.read().contains_key(name) || self.aliases.read().contains_key(name)
    }

    /// Registry name assigned to a class
    pub fn class_name(&self, class: &ClassRef) -> String {
        self.resolver.lock().name_of(class)
    }

    /// All registered names, sorted
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the factory responsible for a runtime value.
    ///
    /// Resolution order: the value's own resolved name; the generic `Function`
    /// factory for callables; lazy registration for auto-serializable classes;
    /// then the class's ancestors, nearest first, excluding the `Object` root.
    /// Aliases only serve lookups by name when reading; a value is never
    /// matched to a factory through one.
    pub fn find_factory(&self, value: &Value) -> Result<FactoryMatch> {
        let name = self.resolver.lock().name_of_value(value);

        let named = self.factories.read().get(&name).cloned();
        if let Some(factory) = named {
            let is_self_ref = match value {
                Value::Class(class) => class.ptr_eq(factory.type_identity()),
                _ => false,
            };
            return Ok(FactoryMatch {
                name,
                factory,
                is_self_ref,
            });
        }

        let class = match value {
            Value::Object(object) => {
                if matches!(&*object.read(), ObjectKind::Callable(_)) {
                    return self.named_match(pseudo::FUNCTION);
                }
                object.class()
            }
            Value::Class(class) => {
                return Err(GraphSnapError::NotSerializable(format!(
                    "class token {}",
                    class.name()
                )))
            }
            _ => return Err(GraphSnapError::NotSerializable(name)),
        };

        if class.is_auto_serializable() {
            self.register(RecordFactory::shared(&class), &[])?;
            return self.named_match(&name);
        }

        for ancestor in class.ancestors() {
            if ancestor.ptr_eq(intrinsic::object()) {
                break;
            }
            let ancestor_name = self.class_name(ancestor);
            let registered = self.factories.read().get(&ancestor_name).cloned();
            if let Some(factory) = registered {
                if factory.type_identity().ptr_eq(ancestor) {
                    return Ok(FactoryMatch {
                        name: ancestor_name,
                        factory,
                        is_self_ref: false,
                    });
                }
            }
        }

        Err(GraphSnapError::NotSerializable(name))
    }

    /// Name every extra factory with this registry's resolver, without registering them
    pub(crate) fn name_extras(
        &self,
        extras: &[Arc<dyn Factory>],
    ) -> HashMap<String, Arc<dyn Factory>> {
        let mut resolver = self.resolver.lock();
        extras
            .iter()
            .map(|factory| (resolver.name_of(factory.type_identity()), factory.clone()))
            .collect()
    }

    fn named_match(&self, name: &str) -> Result<FactoryMatch> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GraphSnapError::UnknownClass(name.to_string()))?;
        Ok(FactoryMatch {
            name: name.to_string(),
            factory,
            is_self_ref: false,
        })
    }
}

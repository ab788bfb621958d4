/*!
The serializer facade.

[`GraphSerializer`] ties a [`SerializerConfig`] to a shared [`FactoryRegistry`]
and runs the walkers. It holds no per-run state, so one instance can serve
concurrent calls from many tasks.
*/

use std::sync::Arc;

use tracing::{debug, warn};

use crate::builtin::BuiltinOptions;
use crate::class::ClassRef;
use crate::config::SerializerConfig;
use crate::de::DeserializeWalker;
use crate::factory::Factory;
use crate::node::parse_text;
use crate::output::OutputBuilder;
use crate::registry::FactoryRegistry;
use crate::ser::SerializeWalker;
use crate::value::Value;
use crate::Result;

#[cfg(feature = "metrics")]
use crate::observability::{MetricsTimer, Operation};

/// Identity-preserving serializer for runtime value graphs.
///
/// # Example
/// ```rust
/// use graphsnap_core::{GraphSerializer, Value};
///
/// # futures::executor::block_on(async {
/// let serializer = GraphSerializer::with_builtins()?;
///
/// let shared = Value::object_from([("name", Value::from("memo"))]);
/// let root = Value::array([shared.clone(), shared]);
///
/// let text = serializer.serialize(&root).await?;
/// let back = serializer.deserialize(&text, &[]).await?;
/// assert!(back.at(0).unwrap().same_identity(&back.at(1).unwrap()));
/// # Ok::<(), graphsnap_core::GraphSnapError>(())
/// # }).unwrap();
/// ```
pub struct GraphSerializer {
    config: SerializerConfig,
    registry: Arc<FactoryRegistry>,
}

impl GraphSerializer {
    /// Create a serializer over an existing registry
    pub fn new(config: SerializerConfig, registry: Arc<FactoryRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    /// Default configuration and a fresh registry holding the built-in factories
    pub fn with_builtins() -> Result<Self> {
        Self::from_config(SerializerConfig::default())
    }

    /// Fresh built-in registry configured from `config`
    pub fn from_config(config: SerializerConfig) -> Result<Self> {
        let options = BuiltinOptions {
            pending_tasks: config.pending_tasks,
        };
        let registry = Arc::new(FactoryRegistry::with_builtin_options(&options)?);
        Self::new(config, registry)
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FactoryRegistry> {
        &self.registry
    }

    /// Encode a value graph into envelope text
    pub async fn serialize(&self, value: &Value) -> Result<String> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start(Operation::Serialize);

        let result = self.serialize_inner(value).await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok((text, nodes)) => timer.finish(*nodes, text.len()),
            Err(_) => timer.finish_with_error(),
        }

        result.map(|(text, _)| text)
    }

    async fn serialize_inner(&self, value: &Value) -> Result<(String, usize)> {
        let walker = SerializeWalker::new(&self.registry, self.config.max_depth);
        let (root, arena) = walker.run(value).await?;

        let mut builder = OutputBuilder::new(&arena);
        let text = builder.finish(&self.config.format_version, &root, self.config.pretty)?;

        debug!(
            "Serialized graph: {} nodes, {} ref markers, {} bytes",
            arena.len(),
            builder.markers(),
            text.len()
        );
        Ok((text, arena.len()))
    }

    /// Rebuild a value graph from envelope text.
    ///
    /// `extra` factories are consulted before the registry for this call only
    /// and are not registered.
    pub async fn deserialize(&self, text: &str, extra: &[Arc<dyn Factory>]) -> Result<Value> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start(Operation::Deserialize);

        let result = self.deserialize_inner(text, extra).await;

        #[cfg(feature = "metrics")]
        match &result {
            Ok((_, nodes)) => timer.finish(*nodes, text.len()),
            Err(_) => timer.finish_with_error(),
        }

        result.map(|(value, _)| value)
    }

    async fn deserialize_inner(
        &self,
        text: &str,
        extra: &[Arc<dyn Factory>],
    ) -> Result<(Value, usize)> {
        let parsed = parse_text(text, self.config.max_depth)?;
        let envelope = DeserializeWalker::envelope(parsed)?;
        if envelope.version != self.config.format_version {
            warn!(
                "Envelope version '{}' differs from configured '{}'",
                envelope.version, self.config.format_version
            );
        }

        let walker = DeserializeWalker::new(&self.registry, extra, self.config.max_depth);
        let (value, nodes) = walker.run(envelope.root).await?;
        debug!("Deserialized graph: {} nodes", nodes);
        Ok((value, nodes))
    }

    /// Register a factory on the shared registry
    pub fn register(&self, factory: Arc<dyn Factory>, aliases: &[&str]) -> Result<()> {
        self.registry.register(factory, aliases)
    }

    /// Remove a factory from the shared registry
    pub fn deregister(&self, class: &ClassRef) -> bool {
        self.registry.deregister(class)
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.registry.has_factory(name)
    }
}

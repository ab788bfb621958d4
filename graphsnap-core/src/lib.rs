/*!
# GraphSnap Core Engine

Identity-preserving serialization of in-memory object graphs.

This crate turns a graph of [`Value`]s into a self-describing JSON envelope and
rebuilds an equivalent graph from it, with support for:

- Shared references and cycles: a value reachable along several paths is
  written once and restored as a single object
- A pluggable [`FactoryRegistry`] mapping classes to conversion strategies,
  with ancestor lookup for subclasses
- Built-in factories for primitives, containers, dates, regular expressions,
  errors, byte buffers, abort controllers, settled tasks and named callables
- Compressed, hash-verified archives of encoded graphs

## Wire format

```text
{"version": "1", "root": <encoded>}

<encoded> = JSON primitive
          | [<encoded>, ...]
          | {"<escaped key>": <encoded>, ...}
          | {"__node": true, "class": C, "ref": R, "value": <encoded>}
          | {"__node": true, "class": C, "ref": R, "marker": "ref" | "self"}
```

## Usage

```rust
use graphsnap_core::{GraphSerializer, Value};

# futures::executor::block_on(async {
let serializer = GraphSerializer::with_builtins()?;

let shared = Value::object_from([("turn", Value::from(3))]);
let root = Value::object_from([("a", shared.clone()), ("b", shared)]);

let text = serializer.serialize(&root).await?;
let restored = serializer.deserialize(&text, &[]).await?;

let (a, b) = (restored.get("a").unwrap(), restored.get("b").unwrap());
assert!(a.same_identity(&b));
# Ok::<(), graphsnap_core::GraphSnapError>(())
# }).unwrap();
```
*/

pub mod archive;
pub mod builtin;
pub mod callable;
pub mod class;
pub mod config;
pub mod error;
pub mod factory;
pub mod inspect;
pub mod node;
pub mod observability;
pub mod registry;
pub mod serializer;
pub mod value;

mod de;
mod output;
mod ser;


pub use archive::{
    ArchiveMetadata, CompressionAdapter, GraphArchive, GzipCompressor, LocalFileStorage,
    MemoryStorage, StorageAdapter,
};
pub use builtin::BuiltinOptions;
pub use callable::{Callable, CallableRegistry};
pub use class::{ClassRef, ClassResolver};
pub use config::{PendingTaskPolicy, SerializerConfig};
pub use error::{GraphSnapError, Result};
pub use factory::{Factory, FnFactory, RecordFactory, Snapshot};
pub use inspect::EnvelopeReport;
pub use node::RootNode;
pub use observability::init_observability;
pub use registry::{FactoryMatch, FactoryRegistry};
pub use serializer::GraphSerializer;
pub use value::{ObjectKind, ObjectRef, Value};

/*!
Built-in factories.

Every registry created with [`FactoryRegistry::with_builtins`] carries these:
the primitive pseudo-types, the container types, dates, regular expressions,
errors, byte buffers, abort controllers, deferred tasks and callables.

[`FactoryRegistry::with_builtins`]: crate::FactoryRegistry::with_builtins
*/

mod containers;
mod deferred;
mod function;
mod intrinsics;
mod primitives;

use std::sync::Arc;

use crate::config::PendingTaskPolicy;
use crate::registry::FactoryRegistry;
use crate::Result;

pub use containers::{ArrayFactory, MapFactory, ObjectFactory, SetFactory};
pub use deferred::{AbortControllerFactory, TaskFactory};
pub use function::FunctionFactory;
pub use intrinsics::{BytesFactory, DateFactory, ErrorFactory, RegExpFactory};
pub use primitives::{Primitive, PrimitiveFactory};

/// Knobs for the built-in factory set.
#[derive(Debug, Clone, Default)]
pub struct BuiltinOptions {
    /// What the task factory does with a task that has not settled yet
    pub pending_tasks: PendingTaskPolicy,
}

/// Register every built-in factory into `registry`
pub fn register_builtins(registry: &FactoryRegistry, options: &BuiltinOptions) -> Result<()> {
    for primitive in Primitive::ALL {
        registry.register(Arc::new(PrimitiveFactory::new(primitive)), &[])?;
    }

    registry.register(Arc::new(ObjectFactory::new()), &[])?;
    registry.register(Arc::new(ArrayFactory::new()), &[])?;
    registry.register(Arc::new(MapFactory::new()), &[])?;
    registry.register(Arc::new(SetFactory::new()), &[])?;

    registry.register(Arc::new(DateFactory::new()), &[])?;
    registry.register(Arc::new(RegExpFactory::new()), &[])?;
    registry.register(Arc::new(ErrorFactory::new()), &[])?;
    registry.register(Arc::new(BytesFactory::new()), &["Uint8Array"])?;

    registry.register(Arc::new(AbortControllerFactory::new()), &["AbortSignal"])?;
    registry.register(
        Arc::new(TaskFactory::new(options.pending_tasks)),
        &["Promise"],
    )?;
    registry.register(
        Arc::new(FunctionFactory::new(registry.callables().clone())),
        &[],
    )?;

    Ok(())
}

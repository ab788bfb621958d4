//! Factories for abort controllers and deferred tasks.
//!
//! Both are rebuilt as fresh objects in their recorded terminal state; nothing
//! that was listening on the original survives the round trip.

use async_trait::async_trait;
use tracing::warn;

use crate::class::{intrinsic, ClassRef};
use crate::config::PendingTaskPolicy;
use crate::factory::{take_field, Factory, Snapshot};
use crate::value::{ObjectKind, ObjectRef, TaskState, Value};
use crate::{GraphSnapError, Result};

const FULFILLED: &str = "fulfilled";
const REJECTED: &str = "rejected";

/// Abort controllers, snapshotted as `{aborted, reason}`.
#[derive(Debug, Clone, Default)]
pub struct AbortControllerFactory;

impl AbortControllerFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for AbortControllerFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::abort_controller()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match value.as_object().map(ObjectRef::kind_snapshot) {
            Some(ObjectKind::AbortController(state)) => Ok(Snapshot::fields([
                ("aborted", Value::Bool(state.aborted)),
                ("reason", state.reason),
            ])),
            _ => Err(GraphSnapError::invalid_snapshot(
                self.type_identity().name(),
                "not an abort controller",
            )),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let mut fields = snapshot.into_object(class)?;
        let aborted = match take_field(&mut fields, "aborted", class)?.into_value(class)? {
            Value::Bool(aborted) => aborted,
            other => {
                return Err(GraphSnapError::invalid_snapshot(
                    class,
                    format!("'aborted' must be a boolean, found {other:?}"),
                ))
            }
        };
        let reason = fields
            .remove("reason")
            .map(|reason| reason.into_value(class))
            .transpose()?
            .unwrap_or(Value::Undefined);

        let controller = Value::abort_controller();
        if aborted {
            controller.abort(reason)?;
        }
        Ok(controller)
    }
}

/// Deferred tasks. Only settled tasks have a snapshot:
/// `{status: "fulfilled", value}` or `{status: "rejected", reason}`.
#[derive(Debug, Clone, Default)]
pub struct TaskFactory {
    pending: PendingTaskPolicy,
}

impl TaskFactory {
    pub fn new(pending: PendingTaskPolicy) -> Self {
        Self { pending }
    }

    pub fn policy(&self) -> PendingTaskPolicy {
        self.pending
    }
}

#[async_trait]
impl Factory for TaskFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::task()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        let state = match value.as_object().map(ObjectRef::kind_snapshot) {
            Some(ObjectKind::Task(state)) => state,
            _ => {
                return Err(GraphSnapError::invalid_snapshot(
                    self.type_identity().name(),
                    "not a task",
                ))
            }
        };

        match state {
            TaskState::Fulfilled(value) => Ok(Snapshot::fields([
                ("status", Value::from(FULFILLED)),
                ("value", value),
            ])),
            TaskState::Rejected(reason) => Ok(Snapshot::fields([
                ("status", Value::from(REJECTED)),
                ("reason", reason),
            ])),
            TaskState::Pending => match self.pending {
                PendingTaskPolicy::Reject => Err(GraphSnapError::UnsettledTask),
                PendingTaskPolicy::SerializeAsRejected => {
                    warn!("Serializing a pending task as rejected");
                    Ok(Snapshot::fields([
                        ("status", Value::from(REJECTED)),
                        (
                            "reason",
                            Value::error("Error", "task was still pending when serialized"),
                        ),
                    ]))
                }
            },
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let mut fields = snapshot.into_object(class)?;
        let status = take_field(&mut fields, "status", class)?.into_string(class)?;
        match status.as_str() {
            FULFILLED => {
                let value = take_field(&mut fields, "value", class)?.into_value(class)?;
                Ok(Value::resolved_task(value))
            }
            REJECTED => {
                let reason = take_field(&mut fields, "reason", class)?.into_value(class)?;
                Ok(Value::rejected_task(reason))
            }
            other => Err(GraphSnapError::invalid_snapshot(
                class,
                format!("unknown task status '{other}'"),
            )),
        }
    }
}

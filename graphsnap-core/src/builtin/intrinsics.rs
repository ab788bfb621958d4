//! Factories for dates, regular expressions, errors and byte buffers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::class::{intrinsic, ClassRef};
use crate::factory::{take_field, Factory, Snapshot};
use crate::value::{ErrorValue, ObjectKind, ObjectRef, Value};
use crate::{GraphSnapError, Result};

fn kind_of(value: &Value, class: &ClassRef) -> Result<ObjectKind> {
    value
        .as_object()
        .map(ObjectRef::kind_snapshot)
        .ok_or_else(|| GraphSnapError::invalid_snapshot(class.name(), "not a heap object"))
}

fn wrong_kind(class: &ClassRef, kind: &ObjectKind) -> GraphSnapError {
    GraphSnapError::invalid_snapshot(
        class.name(),
        format!("cannot convert a {} value", kind.class().name()),
    )
}

fn optional_string(
    fields: &mut BTreeMap<String, Snapshot>,
    key: &str,
    class: &str,
) -> Result<Option<String>> {
    match fields.remove(key) {
        None | Some(Snapshot::Value(Value::Null)) | Some(Snapshot::Value(Value::Undefined)) => {
            Ok(None)
        }
        Some(other) => other.into_string(class).map(Some),
    }
}

/// Dates, snapshotted as RFC 3339 text with as many fractional digits as
/// the instant needs, down to nanoseconds.
#[derive(Debug, Clone, Default)]
pub struct DateFactory;

impl DateFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for DateFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::date()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match kind_of(value, self.type_identity())? {
            ObjectKind::Date(at) => Ok(Snapshot::Value(Value::String(
                at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ))),
            other => Err(wrong_kind(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let text = snapshot.into_string(class)?;
        let at = DateTime::parse_from_rfc3339(&text)
            .map_err(|e| GraphSnapError::invalid_snapshot(class, format!("'{text}': {e}")))?;
        Ok(Value::date(at.with_timezone(&Utc)))
    }
}

/// Regular expressions, snapshotted as `{source, flags}`.
#[derive(Debug, Clone, Default)]
pub struct RegExpFactory;

impl RegExpFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for RegExpFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::regexp()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match kind_of(value, self.type_identity())? {
            ObjectKind::RegExp(re) => Ok(Snapshot::fields([
                ("source", Value::String(re.source)),
                ("flags", Value::String(re.flags)),
            ])),
            other => Err(wrong_kind(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let mut fields = snapshot.into_object(class)?;
        let source = take_field(&mut fields, "source", class)?.into_string(class)?;
        let flags = optional_string(&mut fields, "flags", class)?.unwrap_or_default();
        Ok(Value::regexp(source, flags))
    }
}

/// Errors, snapshotted as `{name, message, stack?, cause?}`.
///
/// Not cycle safe: an error whose cause chain leads back to itself cannot be
/// rebuilt.
#[derive(Debug, Clone, Default)]
pub struct ErrorFactory;

impl ErrorFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for ErrorFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::error()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        let error = match kind_of(value, self.type_identity())? {
            ObjectKind::Error(error) => error,
            other => return Err(wrong_kind(self.type_identity(), &other)),
        };

        let mut fields = vec![
            ("name", Value::String(error.name)),
            ("message", Value::String(error.message)),
        ];
        if let Some(stack) = error.stack {
            fields.push(("stack", Value::String(stack)));
        }
        if let Some(cause) = error.cause {
            fields.push(("cause", cause));
        }
        Ok(Snapshot::fields(fields))
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let mut fields = snapshot.into_object(class)?;
        let name = optional_string(&mut fields, "name", class)?.unwrap_or_else(|| "Error".into());
        let message = optional_string(&mut fields, "message", class)?.unwrap_or_default();
        let stack = optional_string(&mut fields, "stack", class)?;
        let cause = fields
            .remove("cause")
            .map(|cause| cause.into_value(class))
            .transpose()?;

        Ok(Value::error_with(ErrorValue {
            name,
            message,
            stack,
            cause,
        }))
    }
}

/// Byte buffers, snapshotted as standard base64 text.
#[derive(Debug, Clone, Default)]
pub struct BytesFactory;

impl BytesFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Factory for BytesFactory {
    fn type_identity(&self) -> &ClassRef {
        intrinsic::bytes()
    }

    async fn to_plain(&self, value: &Value) -> Result<Snapshot> {
        match kind_of(value, self.type_identity())? {
            ObjectKind::Bytes(data) => Ok(Snapshot::Value(Value::String(STANDARD.encode(&data)))),
            other => Err(wrong_kind(self.type_identity(), &other)),
        }
    }

    async fn from_plain(&self, snapshot: Snapshot) -> Result<Value> {
        let class = self.type_identity().name();
        let text = snapshot.into_string(class)?;
        let data = STANDARD
            .decode(text.as_bytes())
            .map_err(|e| GraphSnapError::invalid_snapshot(class, format!("bad base64: {e}")))?;
        Ok(Value::bytes(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_date_keeps_milliseconds() {
        let factory = DateFactory::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let snapshot = factory.to_plain(&Value::date(at)).await.unwrap();

        match &snapshot {
            Snapshot::Value(Value::String(text)) => assert_eq!(text, "2023-11-14T22:13:20.123Z"),
            other => panic!("unexpected snapshot {other:?}"),
        }
        let back = factory.from_plain(snapshot).await.unwrap();
        assert!(back.deep_equals(&Value::date(at)));
    }

    #[tokio::test]
    async fn test_date_keeps_sub_millisecond_precision() {
        let factory = DateFactory::new();
        let at = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        let snapshot = factory.to_plain(&Value::date(at)).await.unwrap();

        match &snapshot {
            Snapshot::Value(Value::String(text)) => {
                assert_eq!(text, "2023-11-14T22:13:20.123456789Z")
            }
            other => panic!("unexpected snapshot {other:?}"),
        }
        match &*factory.from_plain(snapshot).await.unwrap().as_object().unwrap().read() {
            ObjectKind::Date(back) => assert_eq!(*back, at),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_date_rejects_garbage() {
        let err = DateFactory::new()
            .from_plain(Snapshot::Value(Value::from("yesterday")))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphSnapError::InvalidSnapshot { .. }));
    }

    #[tokio::test]
    async fn test_regexp_source_and_flags() {
        let factory = RegExpFactory::new();
        let re = Value::regexp("a+b", "gi");
        let back = factory
            .from_plain(factory.to_plain(&re).await.unwrap())
            .await
            .unwrap();
        assert!(back.deep_equals(&re));
    }

    #[tokio::test]
    async fn test_error_optional_fields() {
        let factory = ErrorFactory::new();
        let plain = Value::error("TypeError", "bad input");
        let snapshot = factory.to_plain(&plain).await.unwrap();
        let fields = snapshot.clone().into_object("Error").unwrap();
        assert!(!fields.contains_key("stack"));
        assert!(!fields.contains_key("cause"));
        assert!(factory.from_plain(snapshot).await.unwrap().deep_equals(&plain));

        let caused = Value::error_with(ErrorValue {
            name: "Error".into(),
            message: "outer".into(),
            stack: Some("at main".into()),
            cause: Some(Value::from("inner")),
        });
        let back = factory
            .from_plain(factory.to_plain(&caused).await.unwrap())
            .await
            .unwrap();
        assert!(back.deep_equals(&caused));
        assert!(factory.create_empty().is_none());
    }

    #[tokio::test]
    async fn test_bytes_base64() {
        let factory = BytesFactory::new();
        let data = Value::bytes(vec![0u8, 1, 2, 254, 255]);
        let snapshot = factory.to_plain(&data).await.unwrap();
        assert!(matches!(&snapshot, Snapshot::Value(Value::String(s)) if s == "AAEC/v8="));
        assert!(factory.from_plain(snapshot).await.unwrap().deep_equals(&data));

        assert!(factory
            .from_plain(Snapshot::Value(Value::from("not base64!")))
            .await
            .is_err());
    }
}

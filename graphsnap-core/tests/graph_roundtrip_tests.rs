/*!
Round-trip integration tests for the serializer.
These tests exercise the public API the way an application embedding the engine would.
*/

use chrono::DateTime;
use graphsnap_core::value::{ErrorValue, ObjectKind, TaskState};
use graphsnap_core::{
    ClassRef, FnFactory, GraphSerializer, GraphSnapError, PendingTaskPolicy, RecordFactory,
    SerializerConfig, Snapshot, Value,
};

fn serializer() -> GraphSerializer {
    GraphSerializer::with_builtins().unwrap()
}

async fn roundtrip(serializer: &GraphSerializer, value: &Value) -> Value {
    let text = serializer.serialize(value).await.unwrap();
    serializer.deserialize(&text, &[]).await.unwrap()
}

#[tokio::test]
async fn test_scalars_roundtrip() {
    let serializer = serializer();
    let scalars = [
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Number(42.0),
        Value::Number(-0.5),
        Value::Number(f64::NAN),
        Value::Number(f64::NEG_INFINITY),
        Value::BigInt(170_141_183_460_469_231_731_687_303_715_884_105_727),
        Value::from("hello"),
        Value::from(""),
        Value::symbol(Some("token")),
    ];

    for scalar in scalars {
        let back = roundtrip(&serializer, &scalar).await;
        assert!(back.deep_equals(&scalar), "{scalar:?} came back as {back:?}");
    }
}

#[tokio::test]
async fn test_nested_containers_roundtrip() {
    let serializer = serializer();
    let root = Value::object_from([
        ("name", Value::from("planner")),
        (
            "steps",
            Value::array([
                Value::object_from([("id", Value::from(1)), ("done", Value::Bool(true))]),
                Value::object_from([("id", Value::from(2)), ("note", Value::Undefined)]),
            ]),
        ),
        ("empty", Value::array([])),
        ("nothing", Value::empty_object()),
    ]);

    let back = roundtrip(&serializer, &root).await;
    assert!(back.deep_equals(&root));
    assert!(back.get("nothing").unwrap().len() == Some(0));
    assert!(back.get("steps").unwrap().at(1).unwrap().get("note").unwrap().is_undefined());
}

#[tokio::test]
async fn test_intrinsics_roundtrip() {
    let serializer = serializer();
    let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
    let cause = Value::error("TypeError", "bad input");
    let root = Value::array([
        Value::date(at),
        Value::regexp("^a+b?$", "gi"),
        Value::error_with(ErrorValue {
            name: "RangeError".to_string(),
            message: "out of range".to_string(),
            stack: Some("RangeError: out of range\n    at check".to_string()),
            cause: Some(cause),
        }),
        Value::bytes(vec![0u8, 1, 2, 254, 255]),
    ]);

    let back = roundtrip(&serializer, &root).await;
    assert!(back.deep_equals(&root));
}

#[tokio::test]
async fn test_map_and_set_keep_object_keys() {
    let serializer = serializer();
    let key = Value::object_from([("k", Value::from(1))]);
    let map = Value::map([
        (key.clone(), Value::from("object key")),
        (Value::from("plain"), Value::from(2)),
    ]);
    let set = Value::set([key.clone(), Value::from(3), Value::from(3)]);
    let root = Value::object_from([("key", key), ("map", map), ("set", set)]);

    let back = roundtrip(&serializer, &root).await;
    assert!(back.deep_equals(&root));

    let key2 = back.get("key").unwrap();
    let found = back.get("map").unwrap().map_get(&key2).unwrap();
    assert_eq!(found.as_str(), Some("object key"));
    assert_eq!(back.get("set").unwrap().len(), Some(2));
}

#[tokio::test]
async fn test_shared_instances_are_not_duplicated() {
    let serializer = serializer();
    let a = Value::object_from([("name", Value::from("A"))]);
    let b = Value::object_from([("name", Value::from("B")), ("a", a.clone())]);
    let c = Value::object_from([("name", Value::from("C")), ("a", a), ("b", b)]);

    let c2 = roundtrip(&serializer, &c).await;
    let a2 = c2.get("a").unwrap();
    let b2 = c2.get("b").unwrap();
    assert!(a2.same_identity(&b2.get("a").unwrap()));
    assert_eq!(a2.get("name").unwrap().as_str(), Some("A"));
}

#[tokio::test]
async fn test_self_reference() {
    let serializer = serializer();
    let a = Value::object_from([("name", Value::from("loop"))]);
    a.set_field("self", a.clone()).unwrap();

    let a2 = roundtrip(&serializer, &a).await;
    assert!(a2.get("self").unwrap().same_identity(&a2));
}

#[tokio::test]
async fn test_longer_cycle_through_array_and_map() {
    let serializer = serializer();
    let list = Value::array([]);
    let owner = Value::object_from([("items", list.clone())]);
    let index = Value::map([(Value::from("owner"), owner.clone())]);
    list.push(index).unwrap();

    let owner2 = roundtrip(&serializer, &owner).await;
    let index2 = owner2.get("items").unwrap().at(0).unwrap();
    let back_to_owner = index2.map_get(&Value::from("owner")).unwrap();
    assert!(back_to_owner.same_identity(&owner2));
}

#[tokio::test]
async fn test_registration_is_idempotent_and_conflicts_on_other_identity() {
    let serializer = serializer();
    let agent = ClassRef::new("Agent");
    let factory = RecordFactory::shared(&agent);

    serializer.register(factory.clone(), &["agent"]).unwrap();
    serializer.register(factory, &["agent"]).unwrap();
    assert!(serializer.has_factory("Agent"));
    assert!(serializer.has_factory("agent"));

    let impostor = ClassRef::new("Agent");
    let err = serializer
        .register(RecordFactory::shared(&impostor), &["agent"])
        .unwrap_err();
    assert!(matches!(err, GraphSnapError::RegistryConflict { name } if name == "agent"));

    assert!(serializer.deregister(&agent));
    assert!(!serializer.has_factory("Agent"));
    assert!(!serializer.has_factory("agent"));
    assert!(!serializer.deregister(&agent));
}

#[tokio::test]
async fn test_same_display_name_gets_distinct_tags() {
    let serializer = serializer();
    let first = ClassRef::new("Tool");
    let second = ClassRef::new("Tool");
    serializer.register(RecordFactory::shared(&first), &[]).unwrap();
    serializer.register(RecordFactory::shared(&second), &[]).unwrap();

    let root = Value::array([
        Value::record(&first, [("n", Value::from(1))]),
        Value::record(&second, [("n", Value::from(2))]),
    ]);
    let text = serializer.serialize(&root).await.unwrap();
    assert!(text.contains(r#""class":"Tool""#));
    assert!(text.contains(r#""class":"Tool#1""#));

    let back = serializer.deserialize(&text, &[]).await.unwrap();
    assert!(back.deep_equals(&root));
}

#[tokio::test]
async fn test_missing_class_recovered_with_extra_factories() {
    let agent = ClassRef::new("Agent");
    let writer = serializer();
    writer.register(RecordFactory::shared(&agent), &[]).unwrap();

    let original = Value::record(&agent, [("goal", Value::from("summarize"))]);
    let text = writer.serialize(&original).await.unwrap();

    let reader = serializer();
    let err = reader.deserialize(&text, &[]).await.unwrap_err();
    assert!(matches!(err, GraphSnapError::UnknownClass(name) if name == "Agent"));

    let restored = reader
        .deserialize(&text, &[RecordFactory::shared(&agent)])
        .await
        .unwrap();
    assert!(restored.deep_equals(&original));
    assert!(!reader.has_factory("Agent"));
}

#[tokio::test]
async fn test_callables_keep_behaviour_and_bindings() {
    let serializer = serializer();
    let callables = serializer.registry().callables().clone();
    callables
        .register("scale", |bindings, args| {
            let factor = bindings.first().and_then(Value::as_f64).unwrap_or(1.0);
            let input = args.first().and_then(Value::as_f64).unwrap_or(0.0);
            Ok(Value::Number(factor * input))
        })
        .unwrap();

    let max = callables.bind("Math.max", vec![]).unwrap();
    let triple = callables.bind("scale", vec![Value::from(3)]).unwrap();
    let root = Value::object_from([("max", max.clone()), ("triple", triple.clone())]);

    let back = roundtrip(&serializer, &root).await;
    assert!(back.deep_equals(&root));

    let args = [Value::from(4), Value::from(9), Value::from(-1)];
    let max2 = back.get("max").unwrap();
    assert_eq!(max2.call(&args).unwrap().as_f64(), max.call(&args).unwrap().as_f64());

    let triple2 = back.get("triple").unwrap();
    assert_eq!(triple2.call(&[Value::from(5)]).unwrap().as_f64(), Some(15.0));
}

#[tokio::test]
async fn test_callable_missing_on_reader_fails() {
    let writer = serializer();
    writer
        .registry()
        .callables()
        .register("helper", |_, _| Ok(Value::Null))
        .unwrap();
    let helper = writer.registry().callables().bind("helper", vec![]).unwrap();
    let text = writer.serialize(&helper).await.unwrap();

    let err = serializer().deserialize(&text, &[]).await.unwrap_err();
    assert!(matches!(err.root_cause(), GraphSnapError::UnknownCallable(name) if name == "helper"));
}

#[tokio::test]
async fn test_settled_tasks_roundtrip() {
    let serializer = serializer();
    let root = Value::array([
        Value::resolved_task(Value::from("done")),
        Value::rejected_task(Value::error("Error", "boom")),
    ]);
    let back = roundtrip(&serializer, &root).await;
    assert!(back.deep_equals(&root));
}

#[tokio::test]
async fn test_pending_task_is_rejected_by_default() {
    let serializer = serializer();
    let root = Value::object_from([("work", Value::pending_task())]);
    let err = serializer.serialize(&root).await.unwrap_err();
    assert!(matches!(err.root_cause(), GraphSnapError::UnsettledTask));
}

#[tokio::test]
async fn test_pending_task_policy_serializes_as_rejected() {
    let config = SerializerConfig {
        pending_tasks: PendingTaskPolicy::SerializeAsRejected,
        ..SerializerConfig::default()
    };
    let serializer = GraphSerializer::from_config(config).unwrap();

    let back = roundtrip(&serializer, &Value::pending_task()).await;
    let kind = back.as_object().unwrap().kind_snapshot();
    assert!(matches!(kind, ObjectKind::Task(TaskState::Rejected(_))));
}

#[tokio::test]
async fn test_abort_controller_roundtrip() {
    let serializer = serializer();
    let controller = Value::abort_controller();
    controller.abort(Value::from("user cancelled")).unwrap();
    let idle = Value::abort_controller();
    let root = Value::array([controller, idle]);

    let back = roundtrip(&serializer, &root).await;
    assert!(back.deep_equals(&root));
}

#[tokio::test]
async fn test_subclass_uses_nearest_registered_ancestor() {
    let serializer = serializer();
    let base = ClassRef::new("Memory");
    let derived = ClassRef::extends("ShortTermMemory", &base);
    serializer.register(RecordFactory::shared(&base), &[]).unwrap();

    let value = Value::record(&derived, [("size", Value::from(8))]);
    let found = serializer.registry().find_factory(&value).unwrap();
    assert_eq!(found.name, "Memory");

    let back = roundtrip(&serializer, &value).await;
    assert!(back.as_object().unwrap().class().ptr_eq(&base));
    assert_eq!(back.get("size").unwrap().as_f64(), Some(8.0));
}

#[tokio::test]
async fn test_alias_is_not_used_for_an_unregistered_class_of_that_name() {
    let serializer = serializer();
    let point = ClassRef::new("Point");
    serializer
        .register(RecordFactory::shared(&point), &["Vector"])
        .unwrap();

    let vector = ClassRef::new("Vector");
    let err = serializer
        .serialize(&Value::record(&vector, [("x", Value::from(1))]))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphSnapError::NotSerializable(name) if name == "Vector"));

    // Text tagged with the alias still reads back as the aliased class
    let text = r#"{"version":"1","root":{"__node":true,"class":"Vector","ref":"1","value":{"x":1}}}"#;
    let back = serializer.deserialize(text, &[]).await.unwrap();
    assert!(back.as_object().unwrap().class().ptr_eq(&point));
}

#[tokio::test]
async fn test_reregistered_class_reads_existing_text() {
    let serializer = serializer();
    let original = ClassRef::new("Agent");
    serializer
        .register(RecordFactory::shared(&original), &[])
        .unwrap();
    let text = serializer
        .serialize(&Value::record(&original, [("name", Value::from("scout"))]))
        .await
        .unwrap();

    assert!(serializer.deregister(&original));
    assert!(!serializer.has_factory("Agent"));

    let reloaded = ClassRef::new("Agent");
    serializer
        .register(RecordFactory::shared(&reloaded), &[])
        .unwrap();
    assert!(serializer.has_factory("Agent"));
    assert!(!serializer.has_factory("Agent#1"));

    let back = serializer.deserialize(&text, &[]).await.unwrap();
    assert!(back.as_object().unwrap().class().ptr_eq(&reloaded));
    assert_eq!(back.get("name").and_then(|v| v.as_str().map(str::to_string)), Some("scout".to_string()));

    let again = serializer.serialize(&back).await.unwrap();
    assert_eq!(again, text);
}

#[tokio::test]
async fn test_unregistered_class_is_not_serializable() {
    let serializer = serializer();
    let stranger = ClassRef::new("Stranger");
    let err = serializer
        .serialize(&Value::record(&stranger, Vec::<(String, Value)>::new()))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), GraphSnapError::NotSerializable(_)));
}

#[tokio::test]
async fn test_auto_serializable_class_registers_lazily() {
    let serializer = serializer();
    let note = ClassRef::auto_serializable("Note");
    assert!(!serializer.has_factory("Note"));

    let value = Value::record(&note, [("text", Value::from("remember"))]);
    let back = roundtrip(&serializer, &value).await;
    assert!(serializer.has_factory("Note"));
    assert!(back.deep_equals(&value));
}

#[tokio::test]
async fn test_class_token_roundtrips_as_self_reference() {
    let serializer = serializer();
    let agent = ClassRef::new("Agent");
    serializer.register(RecordFactory::shared(&agent), &[]).unwrap();

    let root = Value::object_from([
        ("kind", Value::Class(agent.clone())),
        ("instance", Value::record(&agent, [("id", Value::from(7))])),
    ]);
    let text = serializer.serialize(&root).await.unwrap();
    assert!(text.contains(r#""marker":"self""#));

    let back = serializer.deserialize(&text, &[]).await.unwrap();
    match back.get("kind").unwrap() {
        Value::Class(class) => assert!(class.ptr_eq(&agent)),
        other => panic!("Expected a class token, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shared_symbol_keeps_identity() {
    let serializer = serializer();
    let symbol = Value::symbol(Some("id"));
    let root = Value::array([symbol.clone(), symbol]);

    let back = roundtrip(&serializer, &root).await;
    assert!(back.at(0).unwrap().same_identity(&back.at(1).unwrap()));
}

#[tokio::test]
async fn test_reserved_keys_are_escaped() {
    let serializer = serializer();
    let root = Value::object_from([
        ("__node", Value::Bool(true)),
        ("~tilde", Value::from(1)),
        ("plain", Value::from(2)),
    ]);
    let text = serializer.serialize(&root).await.unwrap();
    assert!(text.contains(r#""~__node":true"#));
    assert!(text.contains(r#""~~tilde":1"#));

    let back = serializer.deserialize(&text, &[]).await.unwrap();
    assert!(back.deep_equals(&root));
}

#[tokio::test]
async fn test_invalid_snapshot_shape_is_rejected() {
    let serializer = serializer();
    let wrapper = ClassRef::new("Wrapper");
    let factory = FnFactory::new(
        &wrapper,
        |_| Ok(Snapshot::Value(Value::empty_object())),
        |_| Ok(Value::Null),
    );
    serializer.register(factory.into_shared(), &[]).unwrap();

    let err = serializer
        .serialize(&Value::native(&wrapper, 5u32))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), GraphSnapError::InvalidSnapshot { class, .. } if class == "Wrapper"));
}

#[tokio::test]
async fn test_native_instances_through_custom_factory() {
    #[derive(Debug, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
    }

    let serializer = serializer();
    let point = ClassRef::new("Point");
    let class = point.clone();
    let factory = FnFactory::new(
        &point,
        |value| {
            let object = value.as_object().ok_or_else(|| GraphSnapError::validation("not a point"))?;
            match &*object.read() {
                ObjectKind::Instance(instance) => match &instance.state {
                    graphsnap_core::value::InstanceState::Native(data) => {
                        let p = data
                            .downcast_ref::<Point>()
                            .ok_or_else(|| GraphSnapError::validation("not a point"))?;
                        Ok(Snapshot::values([Value::Number(p.x), Value::Number(p.y)]))
                    }
                    _ => Err(GraphSnapError::validation("not a point")),
                },
                _ => Err(GraphSnapError::validation("not a point")),
            }
        },
        move |snapshot| {
            let coords = snapshot
                .into_array("Point")?
                .into_iter()
                .map(|c| c.into_value("Point").map(|v| v.as_f64().unwrap_or(f64::NAN)))
                .collect::<graphsnap_core::Result<Vec<_>>>()?;
            Ok(Value::native(&class, Point { x: coords[0], y: coords[1] }))
        },
    );
    serializer.register(factory.into_shared(), &[]).unwrap();

    let original = Value::native(&point, Point { x: 1.5, y: -2.0 });
    let back = roundtrip(&serializer, &original).await;
    let object = back.as_object().unwrap().kind_snapshot();
    match object {
        ObjectKind::Instance(instance) => match instance.state {
            graphsnap_core::value::InstanceState::Native(data) => {
                assert_eq!(data.downcast_ref::<Point>(), Some(&Point { x: 1.5, y: -2.0 }));
            }
            other => panic!("Expected a native instance, got {other:?}"),
        },
        other => panic!("Expected an instance, got {other:?}"),
    }
}

#[tokio::test]
async fn test_depth_limit_applies_both_ways() {
    let shallow = GraphSerializer::from_config(SerializerConfig {
        max_depth: 8,
        ..SerializerConfig::default()
    })
    .unwrap();

    let mut deep = Value::array([]);
    for _ in 0..20 {
        deep = Value::array([deep]);
    }
    let err = shallow.serialize(&deep).await.unwrap_err();
    assert!(matches!(err.root_cause(), GraphSnapError::DepthLimitExceeded(8)));

    let text = serializer().serialize(&deep).await.unwrap();
    let err = shallow.deserialize(&text, &[]).await.unwrap_err();
    assert!(matches!(err, GraphSnapError::DepthLimitExceeded(8)));
}

fn linked_chain(links: i32) -> Value {
    let mut head = Value::Null;
    for i in 0..links {
        head = Value::object_from([("i", Value::from(i)), ("prev", head)]);
    }
    head
}

#[tokio::test]
async fn test_long_chain_roundtrips_under_default_config() {
    let serializer = serializer();
    let head = linked_chain(1_000);

    let text = serializer.serialize(&head).await.unwrap();
    let back = serializer.deserialize(&text, &[]).await.unwrap();

    let mut link = back;
    let mut expected = 999.0;
    loop {
        assert_eq!(link.get("i").and_then(|v| v.as_f64()), Some(expected));
        match link.get("prev") {
            Some(prev) if !prev.is_null() => {
                link = prev;
                expected -= 1.0;
            }
            _ => break,
        }
    }
    assert_eq!(expected, 0.0);
}

#[tokio::test]
async fn test_chain_beyond_depth_limit_is_refused() {
    let serializer = serializer();
    let max_depth = serializer.config().max_depth;
    let head = linked_chain(max_depth as i32);

    let err = serializer.serialize(&head).await.unwrap_err();
    assert!(matches!(err, GraphSnapError::DepthLimitExceeded(d) if d == max_depth));

    let permissive = GraphSerializer::from_config(SerializerConfig {
        max_depth: max_depth * 4,
        ..SerializerConfig::default()
    })
    .unwrap();
    let text = permissive.serialize(&head).await.unwrap();
    let err = serializer.deserialize(&text, &[]).await.unwrap_err();
    assert!(matches!(err, GraphSnapError::DepthLimitExceeded(d) if d == max_depth));
}

#[tokio::test]
async fn test_pretty_output_parses_back() {
    let serializer = GraphSerializer::from_config(SerializerConfig::pretty()).unwrap();
    let root = Value::object_from([("list", Value::array([Value::from(1), Value::from(2)]))]);

    let text = serializer.serialize(&root).await.unwrap();
    assert!(text.contains('\n'));
    let back = serializer.deserialize(&text, &[]).await.unwrap();
    assert!(back.deep_equals(&root));
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let serializer = serializer();
    for text in [
        r#"{"root": 1}"#,
        r#"{"version": "1"}"#,
        r#"{"version": 1, "root": 1}"#,
        r#"{"version": "1", "root": {"__node": true, "ref": "1", "value": 1}}"#,
    ] {
        let err = serializer.deserialize(text, &[]).await.unwrap_err();
        assert!(
            matches!(err, GraphSnapError::MalformedEnvelope(_)),
            "{text} gave {err:?}"
        );
    }

    let dangling = r#"{"version":"1","root":{"__node":true,"class":"Object","ref":"9","marker":"ref"}}"#;
    let err = serializer.deserialize(dangling, &[]).await.unwrap_err();
    assert!(matches!(err, GraphSnapError::MissingReference(id) if id == "9"));
}

#[tokio::test]
async fn test_extra_factory_shadows_registry_for_one_call() {
    let serializer = serializer();
    let agent = ClassRef::new("Agent");
    serializer.register(RecordFactory::shared(&agent), &[]).unwrap();
    let text = serializer
        .serialize(&Value::record(&agent, [("id", Value::from(1))]))
        .await
        .unwrap();

    let shadow = FnFactory::new(
        &agent,
        |_| Ok(Snapshot::Value(Value::Null)),
        |_| Ok(Value::from("shadowed")),
    );
    let shadowed = serializer
        .deserialize(&text, &[shadow.into_shared()])
        .await
        .unwrap();
    assert_eq!(shadowed.as_str(), Some("shadowed"));

    let normal = serializer.deserialize(&text, &[]).await.unwrap();
    assert_eq!(normal.get("id").unwrap().as_f64(), Some(1.0));
}

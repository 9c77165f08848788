//! Reference semantics of host objects handed to scripts.

mod common;

use std::rc::Rc;

use common::{engine, scene};
use mapscript::map::shared;
use mapscript::script::{
    CowWrapper, EntityWrapper, ListWrapper, MapWrapper, NodeWrapper, PropertyBag, RoomWrapper,
    Wrapper,
};
use mapscript::{BridgeError, Entity, HostValue};
use mlua::Value;

#[test]
fn test_every_facade_roundtrips_by_reference() {
    let engine = engine();
    let (room, entities) = scene(&[0]);
    let wrappers: Vec<Rc<dyn Wrapper>> = vec![
        Rc::new(EntityWrapper::new(Rc::clone(&entities[0]))),
        Rc::new(MapWrapper::new(shared(PropertyBag::new()))),
        Rc::new(ListWrapper::values(shared(vec![HostValue::Int(1)]))),
        Rc::new(CowWrapper::new(Rc::clone(&entities[0]))),
        Rc::new(RoomWrapper::new(Rc::clone(&room))),
        Rc::new(NodeWrapper::new(shared(vec![mapscript::Node::new(1, 2)]), 0)),
    ];

    for wrapper in wrappers {
        let pushed = engine.push_wrapper(Rc::clone(&wrapper)).unwrap();
        let pulled = engine.pull_wrapper(&pushed).unwrap();
        assert!(Rc::ptr_eq(&pulled, &wrapper), "{} lost identity", wrapper.kind());
    }
}

#[test]
fn test_entity_passed_through_script_comes_back_identical() {
    let engine = engine();
    let (_, entities) = scene(&[0]);
    let pushed = engine
        .push_wrapper(Rc::new(EntityWrapper::new(Rc::clone(&entities[0]))))
        .unwrap();
    engine.lua().globals().set("held", pushed).unwrap();

    let echoed: Value = engine
        .eval_source("echo", "local t = { inner = held } return t.inner")
        .unwrap();
    let entity = mapscript::script::marshal::pull_entity(engine.lua(), &echoed).unwrap();
    assert!(Rc::ptr_eq(&entity, &entities[0]));
}

#[test]
fn test_equality_is_identity_not_content() {
    let engine = engine();
    let a = Entity::new(1, "box", 4, 4).with_data("tag", "same").into_ref();
    let twin = Entity::new(1, "box", 4, 4).with_data("tag", "same").into_ref();

    let globals = engine.lua().globals();
    for (name, entity) in [("a1", &a), ("a2", &a), ("twin", &twin)] {
        let pushed = engine
            .push_wrapper(Rc::new(EntityWrapper::new(Rc::clone(entity))))
            .unwrap();
        globals.set(name, pushed).unwrap();
    }

    let same = engine.eval_source("eq", "return a1 == a2").unwrap();
    let different = engine.eval_source("eq", "return a1 == twin").unwrap();
    assert_eq!(engine.pull_value(&same).unwrap(), HostValue::Bool(true));
    assert_eq!(engine.pull_value(&different).unwrap(), HostValue::Bool(false));
}

#[test]
fn test_node_equality_follows_position() {
    let engine = engine();
    let entity = Entity::new(1, "zipper", 0, 0)
        .with_node(4, 4)
        .with_node(4, 4)
        .into_ref();
    let pushed = engine
        .push_wrapper(Rc::new(EntityWrapper::new(Rc::clone(&entity))))
        .unwrap();
    engine.lua().globals().set("e", pushed).unwrap();

    let same = engine.eval_source("eq", "return e.nodes[1] == e.nodes[1]").unwrap();
    let other = engine.eval_source("eq", "return e.nodes[1] == e.nodes[2]").unwrap();
    assert_eq!(engine.pull_value(&same).unwrap(), HostValue::Bool(true));
    assert_eq!(engine.pull_value(&other).unwrap(), HostValue::Bool(false));
}

#[test]
fn test_room_entities_iterate_in_order() {
    let engine = engine();
    let (room, _) = scene(&[5, 6, 7]);
    let pushed = engine.push_wrapper(Rc::new(RoomWrapper::new(room))).unwrap();
    engine.lua().globals().set("room", pushed).unwrap();

    let joined = engine
        .eval_source(
            "iterate",
            r#"local out = {}
            for i, entity in pairs(room.entities) do out[#out + 1] = i .. "=" .. entity.index end
            return table.concat(out, ",") .. ";" .. #room.entities"#,
        )
        .unwrap();
    assert_eq!(
        engine.pull_value(&joined).unwrap(),
        HostValue::Text("1=5,2=6,3=7;3".into())
    );
}

#[test]
fn test_iteration_survives_mutation() {
    let engine = engine();
    let mut bag = PropertyBag::new();
    for key in ["a", "b", "c", "d"] {
        bag.insert(key.to_string(), HostValue::Int(1));
    }
    let pushed = engine.push_wrapper(Rc::new(MapWrapper::new(shared(bag)))).unwrap();
    engine.lua().globals().set("bag", pushed).unwrap();

    let visited = engine
        .eval_source(
            "mutate",
            r#"local n = 0
            for k in pairs(bag) do
                n = n + 1
                bag[k] = nil
                bag["z" .. n] = n
                if n > 100 then break end
            end
            return n"#,
        )
        .unwrap();
    assert!(matches!(engine.pull_value(&visited).unwrap(), HostValue::Int(n) if n <= 101));
}

#[test]
fn test_stale_handle_after_operation() {
    let engine = engine();
    let (_, entities) = scene(&[0]);
    let pushed = engine
        .push_wrapper(Rc::new(EntityWrapper::new(Rc::clone(&entities[0]))))
        .unwrap();
    engine.lua().globals().set("kept", pushed.clone()).unwrap();
    engine.finish_operation();

    assert!(matches!(
        engine.pull_wrapper(&pushed),
        Err(BridgeError::StaleHandle { .. })
    ));
    let err = engine.eval_source("stale", "return kept.x").unwrap_err();
    assert!(err.to_string().contains("stale"));
}

#[test]
fn test_functions_do_not_marshal() {
    let engine = engine();
    let value = engine.eval_source("fn", "return print").unwrap();
    match engine.pull_value(&value) {
        Err(BridgeError::Conversion(err)) => {
            assert_eq!(err.from, "function");
            assert_eq!(err.to, "value");
        }
        other => panic!("unexpected {other:?}"),
    }
}

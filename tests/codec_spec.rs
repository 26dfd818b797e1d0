use std::sync::Arc;

use chrono::{DateTime, Utc};
use modeltree::codec::{
    decode_data, deserialize_data, deserialize_structure, serialize_data, serialize_structure,
    CompositeType, Format, RecordError, TypeRegistry,
};
use modeltree::model::{Composite, LocationSet, ModelTree, NodeId, NodeValue, StorageLocation};
use speculate2::speculate;
use uuid::Uuid;
use StorageLocation::*;

fn instant() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:30:00.123456789Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A profile model with every scalar kind spread over all locations.
fn profile() -> ModelTree {
    let mut tree = ModelTree::new("User");
    let root = tree.root();

    let local = tree.add_child(root, "local", Inherited).unwrap();
    tree.add_child_value(local, "flag", true, Inherited).unwrap();
    tree.add_child_value(local, "tiny", -8i8, Inherited).unwrap();
    tree.add_child_value(local, "short", i16::MIN, Inherited).unwrap();
    tree.add_child_value(local, "int", 40_000i32, Inherited).unwrap();
    tree.add_child_value(local, "long", i64::MIN, Inherited).unwrap();
    tree.add_child_value(local, "byte", 255u8, Inherited).unwrap();
    tree.add_child_value(local, "word", 65_535u16, Inherited).unwrap();
    tree.add_child_value(local, "dword", 7u32, Inherited).unwrap();
    tree.add_child_value(local, "qword", u64::MAX, Inherited).unwrap();
    tree.add_child_value(local, "half", 1.5f32, Inherited).unwrap();
    tree.add_child_value(local, "ratio", 0.1f64, Inherited).unwrap();
    tree.add_child_value(local, "initial", 'é', Inherited).unwrap();
    tree.add_child_value(local, "note", "tab\there\nline <b>&\\", Inherited).unwrap();
    tree.add_child_value(local, "empty", "", Inherited).unwrap();
    tree.add_child(local, "unset", Inherited).unwrap();

    let server = tree.add_child(root, "server", Server).unwrap();
    tree.add_child_value(server, "seen", instant(), Inherited).unwrap();
    tree.add_child_value(server, "id", Uuid::from_u128(0x1234_5678), Inherited).unwrap();
    tree.add_child_value(server, "blob", vec![0u8, 1, 2, 254, 255], Inherited).unwrap();
    tree.add_child_value(server, "v1.2", 12i32, Inherited).unwrap();

    let session = tree.add_child(root, "session", Transient).unwrap();
    tree.add_child_value(session, "cursor", 3u32, Inherited).unwrap();

    let game = tree.add_child(root, "game", Game).unwrap();
    tree.add_child(game, "level", Inherited).unwrap();
    tree
}

fn paths(tree: &ModelTree) -> Vec<(String, Option<StorageLocation>)> {
    tree.prefix(tree.root(), LocationSet::empty())
        .map(|id| (tree.path(id).unwrap(), tree.effective_policy(id)))
        .collect()
}

fn shape_of(source: &ModelTree, format: Format) -> ModelTree {
    let payload = serialize_structure(source, source.root(), LocationSet::empty(), format).unwrap();
    let mut copy = ModelTree::new(source.purpose());
    deserialize_structure(&mut copy, &payload, format).unwrap();
    copy
}

fn values(tree: &ModelTree, ids: impl Iterator<Item = NodeId>) -> Vec<(String, Option<NodeValue>)> {
    ids.map(|id| (tree.path(id).unwrap(), tree.value(id))).collect()
}

fn reward_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.register(
        CompositeType::new("game.Reward")
            .field("a", "i32")
            .field("b", "string")
            .field("c", "timestamp"),
    );
    types
}

fn reward() -> Composite {
    Composite::new("game.Reward")
        .with("a", -42)
        .with("b", "gold\tcoins <x>")
        .with("c", instant())
}

speculate! {
    before {
        let source = profile();
    }

    describe "structure" {
        it "round-trips paths and effective policies in every format" {
            for format in Format::ALL {
                let copy = shape_of(&source, format);
                assert_eq!(paths(&copy), paths(&source), "format {}", format);
            }
        }

        it "carries no values" {
            for format in Format::ALL {
                let copy = shape_of(&source, format);
                assert!(
                    copy.prefix(copy.root(), LocationSet::empty()).all(|id| copy.stored_value(id).is_none()),
                    "format {}", format
                );
            }
        }

        it "restores a non-default root policy" {
            let mut tree = ModelTree::with_root_policy("Cfg", Server);
            let root = tree.root();
            tree.add_child(root, "volume", Inherited).unwrap();

            let copy = shape_of(&tree, Format::Json);
            assert_eq!(copy.effective_policy(copy.find("volume").unwrap()), Some(Server));
        }

        it "keeps a root-level child with an empty name apart from the root" {
            let mut tree = ModelTree::new("P");
            let root = tree.root();
            let blank = tree.add_child(root, "", Server).unwrap();
            tree.add_child(blank, "x", Inherited).unwrap();
            tree.add_child(root, "y", Inherited).unwrap();

            for format in Format::ALL {
                let copy = shape_of(&tree, format);
                assert_eq!(copy.stored_policy(copy.root()), Some(Local), "format {}", format);
                assert_eq!(paths(&copy), paths(&tree), "format {}", format);
            }
        }

        it "keeps only filtered nodes but creates their ancestors" {
            let payload = serialize_structure(&source, source.root(), LocationSet::SERVER, Format::Plain).unwrap();
            let mut copy = ModelTree::new("User");
            let created = deserialize_structure(&mut copy, &payload, Format::Plain).unwrap();

            assert_eq!(created, 5);
            assert!(copy.find("server.seen").is_some());
            assert!(copy.find("local").is_none());
        }

        it "rejects a binary payload with the wrong header" {
            let json = serialize_structure(&source, source.root(), LocationSet::empty(), Format::Json).unwrap();
            let mut copy = ModelTree::new("User");
            assert!(deserialize_structure(&mut copy, &json, Format::Binary).is_err());
            assert!(copy.is_empty());
        }
    }

    describe "data" {
        it "round-trips every scalar kind over local and server nodes" {
            let types = TypeRegistry::new();
            for format in Format::ALL {
                let payload = serialize_data(&source, source.root(), LocationSet::PERSISTENT, format).unwrap();
                let mut copy = shape_of(&source, format);
                let root = copy.root();
                let report = deserialize_data(&mut copy, root, LocationSet::PERSISTENT, &payload, format, &types).unwrap();

                assert!(report.is_complete(), "format {}: {:?}", format, report);
                assert_eq!(report.applied, 18, "format {}", format);
                assert_eq!(
                    values(&copy, copy.prefix(copy.root(), LocationSet::PERSISTENT)),
                    values(&source, source.prefix(source.root(), LocationSet::PERSISTENT)),
                    "format {}", format
                );
                assert_eq!(copy.value(copy.find("session.cursor").unwrap()), None);
            }
        }

        it "writes game values from the lookup" {
            let mut tree = profile();
            tree.set_lookup(Some(Arc::new(|_: &str, name: &str| {
                (name == "level").then(|| NodeValue::from(9u8))
            })));

            let payload = serialize_data(&tree, tree.root(), LocationSet::GAME, Format::Json).unwrap();
            let text = String::from_utf8(payload).unwrap();
            assert_eq!(text, r#"[{"path":"game.level","value":9,"type":"u8"}]"#);
        }

        it "leaves nodes without a record untouched" {
            let payload = serialize_data(&source, source.root(), LocationSet::SERVER, Format::Xml).unwrap();
            let mut copy = profile();
            let root = copy.root();
            let note = copy.find("local.note").unwrap();
            copy.set_value(note, Some(NodeValue::from("mine")));

            deserialize_data(&mut copy, root, LocationSet::empty(), &payload, Format::Xml, &TypeRegistry::new()).unwrap();
            assert_eq!(copy.value(note), Some(NodeValue::from("mine")));
        }

        it "skips unregistered and unconvertible records without failing" {
            let payload = br#"[
                {"path": "local.int", "value": "12", "type": "i32"},
                {"path": "local.byte", "value": 300, "type": "u8"},
                {"path": "local.flag", "value": true, "type": "game.Mystery"},
                {"path": "local.nowhere", "value": 1, "type": "i64"}
            ]"#;
            let mut copy = profile();
            let root = copy.root();
            let report = deserialize_data(&mut copy, root, LocationSet::empty(), payload, Format::Json, &TypeRegistry::new()).unwrap();

            assert_eq!(report.applied, 1);
            assert_eq!(copy.value(copy.find("local.int").unwrap()), Some(NodeValue::I32(12)));
            assert_eq!(copy.value(copy.find("local.byte").unwrap()), Some(NodeValue::U8(255)));
            assert_eq!(report.unmatched, vec!["local.nowhere".to_string()]);

            let skipped: Vec<_> = report.skipped.iter().map(|s| s.path.as_str()).collect();
            assert_eq!(skipped, vec!["local.byte", "local.flag"]);
            assert!(matches!(report.skipped[0].error, RecordError::Coercion { .. }));
            assert!(matches!(report.skipped[1].error, RecordError::UnregisteredType(_)));
        }

        it "fails only when the payload itself is unreadable" {
            let mut copy = profile();
            let root = copy.root();
            assert!(deserialize_data(&mut copy, root, LocationSet::empty(), b"{not json", Format::Json, &TypeRegistry::new()).is_err());
        }
    }

    describe "composites" {
        it "round-trips through the data codec in every format" {
            let types = reward_types();
            for format in Format::ALL {
                let mut tree = ModelTree::new("Quest");
                let root = tree.root();
                let prize = tree.add_child_value(root, "prize", reward(), Inherited).unwrap();

                let payload = serialize_data(&tree, root, LocationSet::empty(), format).unwrap();
                tree.clear_data(root, LocationSet::empty());
                let report = deserialize_data(&mut tree, root, LocationSet::empty(), &payload, format, &types).unwrap();

                assert!(report.is_complete(), "format {}: {:?}", format, report);
                assert_eq!(tree.value(prize), Some(NodeValue::Composite(reward())), "format {}", format);
            }
        }

        it "is tagged with its type name and boxed as text" {
            let mut tree = ModelTree::new("Quest");
            let root = tree.root();
            tree.add_child_value(root, "prize", reward(), Inherited).unwrap();

            let payload = serialize_data(&tree, root, LocationSet::empty(), Format::Json).unwrap();
            let records: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            assert_eq!(records[0]["type"], "game.Reward");
            assert!(records[0]["value"].is_string());
        }

        it "is dropped when its type is not registered" {
            let mut tree = ModelTree::new("Quest");
            let root = tree.root();
            tree.add_child_value(root, "prize", reward(), Inherited).unwrap();
            let payload = serialize_data(&tree, root, LocationSet::empty(), Format::Plain).unwrap();

            let (decoded, skipped) = decode_data(&payload, Format::Plain, &TypeRegistry::new()).unwrap();
            assert!(decoded.is_empty());
            assert!(matches!(&skipped[0].error, RecordError::UnregisteredType(tag) if tag == "game.Reward"));
        }
    }
}

use super::{CodecError, Format, StructureRecord};
use crate::model::{path, LocationSet, ModelTree, NodeId, StorageLocation};

/// Serialize the shape of `start`'s subtree.
///
/// When `start` is the root, the payload opens with a root record carrying
/// the root's location and the model purpose. Every other node passing
/// `filter` contributes its path, plus its location when it overrides the
/// inherited one.
pub fn serialize_structure(
    tree: &ModelTree,
    start: NodeId,
    filter: LocationSet,
    format: Format,
) -> Result<Vec<u8>, CodecError> {
    format.codec().write_structure(&structure_records(tree, start, filter))
}

pub fn structure_records(tree: &ModelTree, start: NodeId, filter: LocationSet) -> Vec<StructureRecord> {
    let mut records = Vec::new();
    if tree.is_root(start) {
        records.push(StructureRecord {
            path: String::new(),
            location: tree.stored_policy(start),
            purpose: Some(tree.purpose().to_string()),
        });
    }
    for id in tree.prefix(start, filter) {
        let location = tree
            .stored_policy(id)
            .filter(|policy| *policy != StorageLocation::Inherited);
        records.push(StructureRecord {
            path: tree.path(id).unwrap_or_default(),
            location,
            purpose: None,
        });
    }
    records
}

/// Rebuild shape from a structure payload, creating any missing path
/// segment and applying received policies. Values are never touched.
///
/// Returns the number of nodes created.
pub fn deserialize_structure(
    tree: &mut ModelTree,
    payload: &[u8],
    format: Format,
) -> Result<usize, CodecError> {
    let records = format.codec().read_structure(payload)?;
    Ok(apply_structure(tree, &records))
}

pub fn apply_structure(tree: &mut ModelTree, records: &[StructureRecord]) -> usize {
    let mut created = 0;
    for (index, record) in records.iter().enumerate() {
        if index == 0 && record.is_root_header() {
            if let Some(purpose) = record.purpose.as_deref() {
                if purpose != tree.purpose() {
                    tracing::warn!(
                        expected = tree.purpose(),
                        received = purpose,
                        "structure payload belongs to another model"
                    );
                }
            }
            if let Some(location) = record.location {
                let root = tree.root();
                if let Err(e) = tree.set_policy(root, location) {
                    tracing::warn!(error = %e, "cannot apply root policy");
                }
            }
            continue;
        }

        let Some(node) = ensure_path(tree, &record.path, &mut created) else {
            tracing::warn!(path = %record.path, "cannot create node");
            continue;
        };
        let policy = record.location.unwrap_or(StorageLocation::Inherited);
        if tree.stored_policy(node) != Some(policy) {
            if let Err(e) = tree.set_policy(node, policy) {
                tracing::warn!(path = %record.path, error = %e, "cannot apply policy");
            }
        }
    }
    created
}

/// Resolve `path` from the root, adding missing segments as inheriting
/// nodes.
fn ensure_path(tree: &mut ModelTree, escaped: &str, created: &mut usize) -> Option<NodeId> {
    let mut current = tree.root();
    // Outside the header, the empty path names a root-level child called "".
    let names = match escaped {
        "" => vec![String::new()],
        _ => path::split(escaped),
    };
    for name in names {
        current = match tree.child(current, &name) {
            Some(existing) => existing,
            None => {
                let id = tree.add_child(current, name, StorageLocation::Inherited).ok()?;
                *created += 1;
                id
            }
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use StorageLocation::*;

    fn sample() -> ModelTree {
        let mut tree = ModelTree::new("User");
        let root = tree.root();
        let profile = tree.add_child(root, "profile", Inherited).unwrap();
        tree.add_child_value(profile, "name", "ada", Inherited).unwrap();
        tree.add_child_value(profile, "rank", 3u8, Server).unwrap();
        let hints = tree.add_child(root, "hints", Game).unwrap();
        tree.add_child(hints, "first", Inherited).unwrap();
        tree
    }

    #[test]
    fn records_list_overrides_only() {
        let tree = sample();
        let records = structure_records(&tree, tree.root(), LocationSet::empty());
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.path.as_str(), r.location))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("", Some(Local)),
                ("profile", None),
                ("profile.name", None),
                ("profile.rank", Some(Server)),
                ("hints", Some(Game)),
                ("hints.first", None),
            ]
        );
        assert_eq!(records[0].purpose.as_deref(), Some("User"));
    }

    #[test]
    fn subtree_records_have_no_root_header() {
        let tree = sample();
        let profile = tree.find("profile").unwrap();
        let records = structure_records(&tree, profile, LocationSet::empty());
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.purpose.is_none()));
    }

    #[test]
    fn apply_creates_missing_segments() {
        let mut tree = ModelTree::new("User");
        let created = apply_structure(
            &mut tree,
            &[StructureRecord {
                path: "a.b.c".to_string(),
                location: Some(Transient),
                purpose: None,
            }],
        );
        assert_eq!(created, 3);
        let c = tree.find("a.b.c").unwrap();
        assert_eq!(tree.effective_policy(c), Some(Transient));
        assert_eq!(tree.stored_policy(tree.find("a").unwrap()), Some(Inherited));
    }

    #[test]
    fn empty_named_child_is_not_the_root() {
        let mut source = ModelTree::new("P");
        let root = source.root();
        let blank = source.add_child(root, "", Server).unwrap();
        source.add_child(blank, "x", Inherited).unwrap();
        source.add_child(root, "y", Inherited).unwrap();

        let records = structure_records(&source, root, LocationSet::empty());
        let mut tree = ModelTree::new("P");
        assert_eq!(apply_structure(&mut tree, &records), 3);

        let root = tree.root();
        assert_eq!(tree.stored_policy(root), Some(Local));
        assert_eq!(tree.effective_policy(tree.child(root, "y").unwrap()), Some(Local));
        let blank = tree.child(root, "").unwrap();
        assert_eq!(tree.effective_policy(blank), Some(Server));
        assert_eq!(tree.effective_policy(tree.child(blank, "x").unwrap()), Some(Server));
    }

    #[test]
    fn applying_twice_creates_nothing_new() {
        let source = sample();
        let records = structure_records(&source, source.root(), LocationSet::empty());
        let mut tree = ModelTree::new("User");
        assert_eq!(apply_structure(&mut tree, &records), 5);
        assert_eq!(apply_structure(&mut tree, &records), 0);
        assert_eq!(tree.len(), 5);
    }
}

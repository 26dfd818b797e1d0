//! ASCII tree rendering for model trees.

use super::location::StorageLocation;
use super::tree::{ModelTree, NodeId};

const LOCAL: char = '●';
const TRANSIENT: char = '○';
const SERVER: char = '◆';
const GAME: char = '◇';

/// Get the symbol for an effective storage location.
fn location_symbol(location: StorageLocation) -> char {
    match location {
        StorageLocation::Local | StorageLocation::Inherited => LOCAL,
        StorageLocation::Transient => TRANSIENT,
        StorageLocation::Server => SERVER,
        StorageLocation::Game => GAME,
    }
}

/// Render a model tree as ASCII art with location symbols.
///
/// The first line is the model purpose. Nodes with an explicit policy are
/// marked with `*`.
///
/// Example output:
/// ```text
/// User
/// ├── ● profile
/// │   ├── ● name
/// │   └── ◆ rank*
/// └── ◇ hints*
/// ```
pub fn render_tree(tree: &ModelTree) -> String {
    let mut output = String::new();
    output.push_str(tree.purpose());
    output.push('\n');
    render_children(&mut output, tree, tree.root(), "");
    output
}

fn render_children(output: &mut String, tree: &ModelTree, parent: NodeId, prefix: &str) {
    let children = tree.children(parent);
    for (i, &child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        render_node(output, tree, child, prefix, is_last);
    }
}

fn render_node(output: &mut String, tree: &ModelTree, id: NodeId, prefix: &str, is_last: bool) {
    let symbol = tree
        .effective_policy(id)
        .map(location_symbol)
        .unwrap_or(LOCAL);
    let branch = if is_last { "└── " } else { "├── " };

    output.push_str(prefix);
    output.push_str(branch);
    output.push(symbol);
    output.push(' ');
    output.push_str(tree.name(id).unwrap_or_default());
    if !matches!(tree.stored_policy(id), Some(StorageLocation::Inherited) | None) {
        output.push('*');
    }
    output.push('\n');

    let continuation = if is_last { "    " } else { "│   " };
    let child_prefix = format!("{}{}", prefix, continuation);
    render_children(output, tree, id, &child_prefix);
}

#[cfg(test)]
mod tests {
    use super::*;
    use StorageLocation::*;

    #[test]
    fn test_empty_model() {
        let tree = ModelTree::new("User");
        assert_eq!(render_tree(&tree), "User\n");
    }

    #[test]
    fn test_with_children() {
        let mut tree = ModelTree::new("User");
        let root = tree.root();
        tree.add_child(root, "name", Inherited).unwrap();
        tree.add_child(root, "rank", Server).unwrap();
        assert_eq!(render_tree(&tree), "User\n├── ● name\n└── ◆ rank*\n");
    }

    #[test]
    fn test_nested_children() {
        let mut tree = ModelTree::new("User");
        let root = tree.root();
        let profile = tree.add_child(root, "profile", Inherited).unwrap();
        tree.add_child(profile, "name", Inherited).unwrap();
        tree.add_child(profile, "rank", Server).unwrap();
        let hints = tree.add_child(root, "hints", Game).unwrap();
        tree.add_child(hints, "first", Inherited).unwrap();

        let expected = "User\n├── ● profile\n│   ├── ● name\n│   └── ◆ rank*\n└── ◇ hints*\n    └── ◇ first\n";
        assert_eq!(render_tree(&tree), expected);
    }
}

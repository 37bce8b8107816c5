use crate::{ColumnMetadata, Schema};

/// Trait for schema introspection
///
/// This trait provides methods for examining and querying schemas
/// without modifying them. Paths are dotted, with list elements addressed
/// through their child name (`element` unless renamed).
pub trait SchemaInspector {
    /// Get the total number of nodes (including nested)
    fn field_count(&self) -> usize;

    /// Get a node by path (e.g., "address.city")
    fn get_field_by_path(&self, path: &str) -> Option<&ColumnMetadata>;

    /// Check if schema contains a specific path
    fn has_field(&self, path: &str) -> bool;

    /// Get all node paths in the schema, parents before children
    fn all_field_paths(&self) -> Vec<String>;
}

impl SchemaInspector for Schema {
    fn field_count(&self) -> usize {
        self.columns.iter().map(count_fields).sum()
    }

    fn get_field_by_path(&self, path: &str) -> Option<&ColumnMetadata> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let root = self.columns.iter().find(|c| c.name == first)?;
        parts.try_fold(root, |node, part| {
            node.children.iter().find(|c| c.name == part)
        })
    }

    fn has_field(&self, path: &str) -> bool {
        self.get_field_by_path(path).is_some()
    }

    fn all_field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for column in &self.columns {
            collect_field_paths(column, String::new(), &mut paths);
        }
        paths
    }
}

fn count_fields(node: &ColumnMetadata) -> usize {
    1 + node.children.iter().map(count_fields).sum::<usize>()
}

fn collect_field_paths(node: &ColumnMetadata, prefix: String, paths: &mut Vec<String>) {
    let current_path = if prefix.is_empty() {
        node.name.clone()
    } else {
        format!("{}.{}", prefix, node.name)
    };

    paths.push(current_path.clone());

    for child in &node.children {
        collect_field_paths(child, current_path.clone(), paths);
    }
}

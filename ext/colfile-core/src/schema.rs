//! Schema trees and the metadata builder that derives them from tables.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::column::default_field_name;
use crate::types::StructField;
use crate::{ColfileError, Column, LogicalType, Result, Table};

/// Name of the single child of a list column
pub const LIST_ELEMENT_NAME: &str = "element";

/// Core schema representation: the ordered top-level columns of a file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnMetadata>,
}

/// A node of the schema tree.
///
/// `children` mirror the physical storage order: one `element` child for
/// lists, one child per field for structs, none for leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ColumnMetadata>,
}

impl ColumnMetadata {
    /// Build a node and its children from a type; nested members are nullable
    pub fn new<S: Into<String>>(name: S, logical_type: LogicalType, nullable: bool) -> Self {
        let children = match &logical_type {
            LogicalType::List(element) => vec![ColumnMetadata::new(
                LIST_ELEMENT_NAME,
                (**element).clone(),
                true,
            )],
            LogicalType::Struct(fields) => fields
                .iter()
                .map(|f| ColumnMetadata::new(f.name.clone(), f.data_type.clone(), true))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            name: name.into(),
            logical_type,
            nullable,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Dotted paths of every leaf below (and including) this node
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_leaf_paths(self, String::new(), &mut paths);
        paths
    }

    /// Check that this node is internally consistent
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ColfileError::schema("Column names must not be empty"));
        }
        match &self.logical_type {
            LogicalType::List(element) => {
                if self.children.len() != 1 || &self.children[0].logical_type != element.as_ref() {
                    return Err(ColfileError::schema(format!(
                        "List column '{}' must have exactly one child of type {}",
                        self.name, element
                    )));
                }
            }
            LogicalType::Struct(fields) => {
                if fields.is_empty() {
                    return Err(ColfileError::schema(format!(
                        "Struct column '{}' has no fields",
                        self.name
                    )));
                }
                let consistent = fields.len() == self.children.len()
                    && fields
                        .iter()
                        .zip(&self.children)
                        .all(|(f, c)| f.name == c.name && f.data_type == c.logical_type);
                if !consistent {
                    return Err(ColfileError::schema(format!(
                        "Struct column '{}' children disagree with its type",
                        self.name
                    )));
                }
                check_unique_names(self.children.iter().map(|c| c.name.as_str()), &self.name)?;
            }
            LogicalType::Decimal { precision, scale } => {
                LogicalType::decimal(*precision, *scale)?;
            }
            _ => {
                if !self.children.is_empty() {
                    return Err(ColfileError::schema(format!(
                        "Leaf column '{}' cannot have children",
                        self.name
                    )));
                }
            }
        }
        self.children.iter().try_for_each(ColumnMetadata::validate)
    }
}

impl Schema {
    /// Derive a schema from a table and caller-supplied names.
    ///
    /// This is a pure transform: one name per top-level column is required;
    /// nested names fall back to `element` for list children and `field_{i}`
    /// for struct members.
    pub fn from_table(table: &Table, metadata: &TableInputMetadata) -> Result<Schema> {
        if metadata.columns.len() != table.num_columns() {
            return Err(ColfileError::schema(format!(
                "Metadata names {} columns but table has {}",
                metadata.columns.len(),
                table.num_columns()
            )));
        }
        let columns = table
            .columns()
            .iter()
            .zip(&metadata.columns)
            .map(|(column, hint)| {
                let name = hint.name.clone().ok_or_else(|| {
                    ColfileError::schema("Every top-level column needs a name")
                })?;
                build_column(column, Some(hint), None, name)
            })
            .collect::<Result<Vec<_>>>()?;
        check_unique_names(columns.iter().map(|c| c.name.as_str()), "<root>")?;
        Ok(Schema { columns })
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn logical_types(&self) -> Vec<LogicalType> {
        self.columns.iter().map(|c| c.logical_type.clone()).collect()
    }

    /// Index and metadata of the top-level column called `name`
    pub fn column(&self, name: &str) -> Option<(usize, &ColumnMetadata)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name == name)
    }

    /// Schema restricted to the given top-level column indices, in that order
    pub fn project(&self, indices: &[usize]) -> Schema {
        Schema {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    /// Check an explicitly constructed schema
    pub fn validate(&self) -> Result<()> {
        check_unique_names(self.columns.iter().map(|c| c.name.as_str()), "<root>")?;
        self.columns.iter().try_for_each(ColumnMetadata::validate)
    }

    /// Check that `table` can be stored under this schema: same column count,
    /// same types (ignoring struct member names), no nulls in non-nullable
    /// columns
    pub fn check_table(&self, table: &Table) -> Result<()> {
        if table.num_columns() != self.columns.len() {
            return Err(ColfileError::schema(format!(
                "Table has {} columns but schema has {}",
                table.num_columns(),
                self.columns.len()
            )));
        }
        for (column, meta) in table.columns().iter().zip(&self.columns) {
            let actual = column.logical_type();
            if !actual.same_shape(&meta.logical_type) {
                return Err(ColfileError::schema(format!(
                    "Column '{}' has type {} but schema declares {}",
                    meta.name, actual, meta.logical_type
                )));
            }
            check_nullability(column, meta)?;
        }
        Ok(())
    }
}

/// Builder for explicitly declared schemas
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<ColumnMetadata>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Result<Schema> {
        let schema = Schema {
            columns: self.columns,
        };
        schema.validate()?;
        Ok(schema)
    }
}

/// Caller-supplied naming, nullability and type hints for a table,
/// positional by top-level column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableInputMetadata {
    pub columns: Vec<ColumnInMetadata>,
}

impl TableInputMetadata {
    pub fn new(columns: Vec<ColumnInMetadata>) -> Self {
        Self { columns }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(ColumnInMetadata::new).collect(),
        }
    }

    pub fn column_mut(&mut self, idx: usize) -> Option<&mut ColumnInMetadata> {
        self.columns.get_mut(idx)
    }
}

/// Hints for one column; unset fields are derived from the data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnInMetadata {
    pub name: Option<String>,
    pub nullable: Option<bool>,
    pub logical_type: Option<LogicalType>,
    pub children: Vec<ColumnInMetadata>,
}

impl ColumnInMetadata {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A hint that only carries children (for unnamed list elements)
    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Declare the expected type; the writer fails with a type mismatch if
    /// the data disagrees
    pub fn with_type(mut self, logical_type: LogicalType) -> Self {
        self.logical_type = Some(logical_type);
        self
    }

    pub fn with_child(mut self, child: ColumnInMetadata) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.name = Some(name.into());
        self
    }
}

fn build_column(
    column: &Column,
    hint: Option<&ColumnInMetadata>,
    inherited: Option<&LogicalType>,
    name: String,
) -> Result<ColumnMetadata> {
    if name.is_empty() {
        return Err(ColfileError::schema("Column names must not be empty"));
    }
    let derived = column.logical_type();
    let declared = hint.and_then(|h| h.logical_type.as_ref()).or(inherited);
    if let Some(declared) = declared {
        if !declared.same_shape(&derived) {
            return Err(ColfileError::type_mismatch(format!(
                "Column '{}' is declared as {} but its data is {}",
                name, declared, derived
            )));
        }
    }

    let hint_children: &[ColumnInMetadata] = hint.map(|h| h.children.as_slice()).unwrap_or(&[]);
    let (logical_type, children) = if let Some(list) = column.as_list() {
        if hint_children.len() > 1 {
            return Err(ColfileError::schema(format!(
                "List column '{}' has one child but metadata names {}",
                name,
                hint_children.len()
            )));
        }
        let declared_element = match declared {
            Some(LogicalType::List(element)) => Some(element.as_ref()),
            _ => None,
        };
        let child_hint = hint_children.first();
        let child_name = child_hint
            .and_then(|h| h.name.clone())
            .unwrap_or_else(|| LIST_ELEMENT_NAME.to_string());
        let child = build_column(list.child(), child_hint, declared_element, child_name)?;
        (LogicalType::List(Box::new(child.logical_type.clone())), vec![child])
    } else if let Some(structure) = column.as_struct() {
        if structure.children().is_empty() {
            return Err(ColfileError::schema(format!(
                "Struct column '{}' has no fields",
                name
            )));
        }
        if hint_children.len() > structure.children().len() {
            return Err(ColfileError::schema(format!(
                "Struct column '{}' has {} fields but metadata names {}",
                name,
                structure.children().len(),
                hint_children.len()
            )));
        }
        let declared_fields = match declared {
            Some(LogicalType::Struct(fields)) => Some(fields.as_slice()),
            _ => None,
        };
        let children = structure
            .children()
            .iter()
            .enumerate()
            .map(|(idx, child)| {
                let child_hint = hint_children.get(idx);
                let declared_field = declared_fields.map(|f| &f[idx]);
                let child_name = child_hint
                    .and_then(|h| h.name.clone())
                    .or_else(|| declared_field.map(|f| f.name.clone()))
                    .unwrap_or_else(|| default_field_name(idx));
                build_column(child, child_hint, declared_field.map(|f| &f.data_type), child_name)
            })
            .collect::<Result<Vec<_>>>()?;
        check_unique_names(children.iter().map(|c| c.name.as_str()), &name)?;
        let fields = children
            .iter()
            .map(|c| StructField::new(c.name.clone(), c.logical_type.clone()))
            .collect();
        (LogicalType::Struct(fields), children)
    } else {
        if !hint_children.is_empty() {
            return Err(ColfileError::schema(format!(
                "Leaf column '{}' cannot have child metadata",
                name
            )));
        }
        (derived, Vec::new())
    };

    let nullable = hint.and_then(|h| h.nullable).unwrap_or(true);
    let meta = ColumnMetadata {
        name,
        logical_type,
        nullable,
        children,
    };
    if !nullable && column.null_count() > 0 {
        return Err(ColfileError::schema(format!(
            "Column '{}' is declared non-nullable but contains {} nulls",
            meta.name,
            column.null_count()
        )));
    }
    Ok(meta)
}

fn check_nullability(column: &Column, meta: &ColumnMetadata) -> Result<()> {
    if !meta.nullable && column.null_count() > 0 {
        return Err(ColfileError::schema(format!(
            "Column '{}' is declared non-nullable but contains {} nulls",
            meta.name,
            column.null_count()
        )));
    }
    if let Some(list) = column.as_list() {
        check_nullability(list.child(), &meta.children[0])?;
    } else if let Some(structure) = column.as_struct() {
        for (child, child_meta) in structure.children().iter().zip(&meta.children) {
            check_nullability(child, child_meta)?;
        }
    }
    Ok(())
}

fn check_unique_names<'a, I: Iterator<Item = &'a str>>(names: I, parent: &str) -> Result<()> {
    let mut seen = IndexSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ColfileError::schema(format!(
                "Duplicate column name '{}' under {}",
                name, parent
            )));
        }
    }
    Ok(())
}

fn collect_leaf_paths(node: &ColumnMetadata, prefix: String, paths: &mut Vec<String>) {
    let path = if prefix.is_empty() {
        node.name.clone()
    } else {
        format!("{}.{}", prefix, node.name)
    };
    if node.is_leaf() {
        paths.push(path);
    } else {
        for child in &node.children {
            collect_leaf_paths(child, path.clone(), paths);
        }
    }
}

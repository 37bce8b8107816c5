//! Per-leaf column statistics recorded in the footer for every row group.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::schema::ColumnMetadata;
use crate::types::Decimal;
use crate::{Column, ColumnData, Result};

/// A min or max value.
///
/// Floats are stored as strings so that the JSON footer round-trips them
/// exactly (including infinities).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum StatValue {
    Boolean(bool),
    Int(i64),
    Float(#[serde(with = "f64_string")] f64),
    Decimal(Decimal),
    String(String),
}

impl StatValue {
    fn compare(&self, other: &StatValue) -> Option<Ordering> {
        match (self, other) {
            (StatValue::Boolean(a), StatValue::Boolean(b)) => Some(a.cmp(b)),
            (StatValue::Int(a), StatValue::Int(b)) => Some(a.cmp(b)),
            (StatValue::Float(a), StatValue::Float(b)) => a.partial_cmp(b),
            (StatValue::Decimal(a), StatValue::Decimal(b)) => Some(a.cmp(b)),
            (StatValue::String(a), StatValue::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }
}

/// Statistics of one leaf column within one row group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Dotted path of the leaf, e.g. `structs.field_0`
    pub path: String,
    pub null_count: u64,
    pub min: Option<StatValue>,
    pub max: Option<StatValue>,
}

impl ColumnStatistics {
    /// Fold another row group's statistics for the same leaf into this one
    pub fn merge(&mut self, other: &ColumnStatistics) {
        self.null_count += other.null_count;
        self.min = pick(self.min.take(), other.min.clone(), Ordering::Less);
        self.max = pick(self.max.take(), other.max.clone(), Ordering::Greater);
    }
}

fn pick(a: Option<StatValue>, b: Option<StatValue>, keep: Ordering) -> Option<StatValue> {
    match (a, b) {
        (Some(a), Some(b)) => {
            if b.compare(&a) == Some(keep) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, b) => a.or(b),
    }
}

/// Statistics for every leaf below `column`, in depth-first order.
///
/// Child rows reachable only through null list rows are not counted.
pub fn collect_statistics(
    column: &Column,
    meta: &ColumnMetadata,
) -> Result<Vec<ColumnStatistics>> {
    let collapsed;
    let column = if column.has_null_list_spans() {
        collapsed = column.with_null_lists_collapsed()?;
        &collapsed
    } else {
        column
    };
    let mut out = Vec::new();
    collect(column, meta, String::new(), &mut out);
    Ok(out)
}

fn collect(column: &Column, meta: &ColumnMetadata, prefix: String, out: &mut Vec<ColumnStatistics>) {
    let path = if prefix.is_empty() {
        meta.name.clone()
    } else {
        format!("{}.{}", prefix, meta.name)
    };
    match column.data() {
        ColumnData::List(list) => {
            if let Some(child_meta) = meta.children.first() {
                collect(list.child(), child_meta, path, out);
            }
        }
        ColumnData::Struct(structure) => {
            for (child, child_meta) in structure.children().iter().zip(&meta.children) {
                collect(child, child_meta, path.clone(), out);
            }
        }
        _ => out.push(leaf_statistics(column, path)),
    }
}

fn leaf_statistics(column: &Column, path: String) -> ColumnStatistics {
    let valid = |idx: &usize| column.is_valid(*idx);
    let rows = 0..column.len();

    let bounds = match column.data() {
        ColumnData::Boolean(v) => min_max(rows.filter(valid).map(|i| v[i])).map(|(lo, hi)| {
            (StatValue::Boolean(lo), StatValue::Boolean(hi))
        }),
        ColumnData::Int8(v) => int_bounds(rows.filter(valid).map(|i| v[i] as i64)),
        ColumnData::Int16(v) => int_bounds(rows.filter(valid).map(|i| v[i] as i64)),
        ColumnData::Int32(v) => int_bounds(rows.filter(valid).map(|i| v[i] as i64)),
        ColumnData::Int64(v) => int_bounds(rows.filter(valid).map(|i| v[i])),
        ColumnData::Float32(v) => float_bounds(rows.filter(valid).map(|i| v[i] as f64)),
        ColumnData::Float64(v) => float_bounds(rows.filter(valid).map(|i| v[i])),
        ColumnData::Decimal(d) => min_max(rows.filter(valid).map(|i| d.value(i)))
            .map(|(lo, hi)| (StatValue::Decimal(lo), StatValue::Decimal(hi))),
        ColumnData::String(s) => min_max(rows.filter(valid).map(|i| s.value(i))).map(|(lo, hi)| {
            (StatValue::String(lo.to_string()), StatValue::String(hi.to_string()))
        }),
        ColumnData::List(_) | ColumnData::Struct(_) => None,
    };

    let (min, max) = match bounds {
        Some((lo, hi)) => (Some(lo), Some(hi)),
        None => (None, None),
    };
    ColumnStatistics {
        path,
        null_count: column.null_count() as u64,
        min,
        max,
    }
}

fn min_max<T: Ord + Clone, I: Iterator<Item = T>>(iter: I) -> Option<(T, T)> {
    iter.fold(None, |acc, v| match acc {
        None => Some((v.clone(), v)),
        Some((lo, hi)) => {
            let lo = if v < lo { v.clone() } else { lo };
            let hi = if v > hi { v } else { hi };
            Some((lo, hi))
        }
    })
}

fn int_bounds<I: Iterator<Item = i64>>(iter: I) -> Option<(StatValue, StatValue)> {
    min_max(iter).map(|(lo, hi)| (StatValue::Int(lo), StatValue::Int(hi)))
}

/// NaN never participates in min/max
fn float_bounds<I: Iterator<Item = f64>>(iter: I) -> Option<(StatValue, StatValue)> {
    iter.filter(|v| !v.is_nan())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .map(|(lo, hi)| (StatValue::Float(lo), StatValue::Float(hi)))
}

mod f64_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<f64>().map_err(D::Error::custom)
    }
}

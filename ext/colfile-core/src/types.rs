//! Logical types describing what a column holds, independent of how it is
//! laid out on disk.

use num::{BigInt, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{ColfileError, Result};

/// Largest precision representable by a 128-bit unscaled decimal value
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// The semantic data kind of a column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Fixed-point value `unscaled * 10^-scale`; a negative scale shifts the
    /// exponent up
    Decimal {
        precision: u8,
        scale: i8,
    },
    String,
    List(Box<LogicalType>),
    Struct(Vec<StructField>),
}

/// A named member of a struct type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub data_type: LogicalType,
}

impl StructField {
    pub fn new<S: Into<String>>(name: S, data_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl LogicalType {
    /// Create a decimal type, validating the precision bound
    pub fn decimal(precision: u8, scale: i8) -> Result<Self> {
        if precision == 0 || precision > MAX_DECIMAL_PRECISION {
            return Err(ColfileError::schema(format!(
                "Decimal precision must be between 1 and {}, got {}",
                MAX_DECIMAL_PRECISION, precision
            )));
        }
        Ok(LogicalType::Decimal { precision, scale })
    }

    pub fn list(element: LogicalType) -> Self {
        LogicalType::List(Box::new(element))
    }

    /// Get the logical type name for display
    pub fn type_name(&self) -> &'static str {
        match self {
            LogicalType::Boolean => "Boolean",
            LogicalType::Int8 => "Int8",
            LogicalType::Int16 => "Int16",
            LogicalType::Int32 => "Int32",
            LogicalType::Int64 => "Int64",
            LogicalType::Float32 => "Float32",
            LogicalType::Float64 => "Float64",
            LogicalType::Decimal { .. } => "Decimal",
            LogicalType::String => "String",
            LogicalType::List(_) => "List",
            LogicalType::Struct(_) => "Struct",
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, LogicalType::List(_) | LogicalType::Struct(_))
    }

    /// Width in bytes of one value for fixed-width types
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            LogicalType::Int8 => Some(1),
            LogicalType::Int16 => Some(2),
            LogicalType::Int32 | LogicalType::Float32 => Some(4),
            LogicalType::Int64 | LogicalType::Float64 => Some(8),
            LogicalType::Decimal { .. } => Some(16),
            _ => None,
        }
    }

    /// Compare two types structurally, ignoring struct field names
    pub fn same_shape(&self, other: &LogicalType) -> bool {
        match (self, other) {
            (LogicalType::List(a), LogicalType::List(b)) => a.same_shape(b),
            (LogicalType::Struct(a), LogicalType::Struct(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.data_type.same_shape(&y.data_type))
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Decimal { precision, scale } => {
                write!(f, "Decimal({}, {})", precision, scale)
            }
            LogicalType::List(element) => write!(f, "List<{}>", element),
            LogicalType::Struct(fields) => {
                write!(f, "Struct<")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
            other => f.write_str(other.type_name()),
        }
    }
}

/// A single fixed-point value.
///
/// Equality and ordering are numeric: both operands are rescaled to the
/// larger of the two scales before comparison, so `(10, 1)` equals `(1, 0)`.
/// Use [`Decimal::unscaled`] and [`Decimal::scale`] when the exact
/// representation matters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decimal {
    #[serde(with = "i128_string")]
    unscaled: i128,
    scale: i8,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: i8) -> Self {
        Self { unscaled, scale }
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    pub fn scale(&self) -> i8 {
        self.scale
    }

    /// Unscaled value expressed at `scale`, which must be >= `self.scale`
    fn rescaled(&self, scale: i8) -> BigInt {
        let shift = (scale as i32 - self.scale as i32) as u32;
        BigInt::from(self.unscaled) * num::pow(BigInt::from(10), shift as usize)
    }

    /// Number of decimal digits in the unscaled value
    pub fn digits(&self) -> u32 {
        let mut magnitude = self.unscaled.unsigned_abs();
        let mut digits = 1;
        while magnitude >= 10 {
            magnitude /= 10;
            digits += 1;
        }
        digits
    }

    /// Canonical `(unscaled, scale)` with trailing zeros stripped
    fn normalized(&self) -> (i128, i32) {
        if self.unscaled == 0 {
            return (0, 0);
        }
        let mut unscaled = self.unscaled;
        let mut scale = self.scale as i32;
        while unscaled % 10 == 0 {
            unscaled /= 10;
            scale -= 1;
        }
        (unscaled, scale)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.scale == other.scale {
            return self.unscaled.cmp(&other.unscaled);
        }
        let scale = self.scale.max(other.scale);
        self.rescaled(scale).cmp(&other.rescaled(scale))
    }
}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.unscaled < 0;
        let digits = self.unscaled.unsigned_abs().to_string();
        let sign = if negative { "-" } else { "" };

        if self.scale <= 0 {
            let zeros = if self.unscaled.is_zero() {
                0
            } else {
                self.scale.unsigned_abs() as usize
            };
            return write!(f, "{}{}{}", sign, digits, "0".repeat(zeros));
        }

        let scale = self.scale as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{}{}.{}", sign, int_part, frac_part)
        } else {
            write!(f, "{}0.{}{}", sign, "0".repeat(scale - digits.len()), digits)
        }
    }
}

/// Serialize 128-bit integers as decimal strings so JSON stays lossless
pub(crate) mod i128_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<i128>().map_err(D::Error::custom)
    }
}

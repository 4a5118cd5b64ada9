//! Core data models for the telemetry wrangler

use crate::error::WrangleError;
use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

/// Format used to render timestamps as text
pub const TIMESTAMP_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell of a telemetry table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Null | Value::Timestamp(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_DISPLAY_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// Target type a column is cast to, as declared in the dtype mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Bool,
    /// Signed integer with the given bit width
    Int(u8),
    /// Unsigned integer with the given bit width
    UInt(u8),
    Float,
    String,
    Category,
    DateTime,
}

impl FromStr for SemanticType {
    type Err = WrangleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let literal = s.trim();
        if literal.starts_with("datetime64") {
            return Ok(SemanticType::DateTime);
        }
        let parsed = match literal.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => SemanticType::Bool,
            "int8" => SemanticType::Int(8),
            "int16" => SemanticType::Int(16),
            "int32" => SemanticType::Int(32),
            "int64" | "int" => SemanticType::Int(64),
            "uint8" => SemanticType::UInt(8),
            "uint16" => SemanticType::UInt(16),
            "uint32" => SemanticType::UInt(32),
            "uint64" => SemanticType::UInt(64),
            "float32" | "float64" | "float" => SemanticType::Float,
            "string" | "str" | "object" => SemanticType::String,
            "category" => SemanticType::Category,
            _ => return Err(WrangleError::UnknownSemanticType(literal.to_string())),
        };
        Ok(parsed)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Bool => write!(f, "bool"),
            SemanticType::Int(bits) => write!(f, "int{}", bits),
            SemanticType::UInt(bits) => write!(f, "uint{}", bits),
            SemanticType::Float => write!(f, "float64"),
            SemanticType::String => write!(f, "string"),
            SemanticType::Category => write!(f, "category"),
            SemanticType::DateTime => write!(f, "datetime64"),
        }
    }
}

/// Logical node slot (node1..node6)
///
/// Slots 1-3 are control-plane eligible, slots 4-6 are worker-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeSlot(pub u8);

impl NodeSlot {
    pub const CONTROL_PLANE: [NodeSlot; 3] = [NodeSlot(1), NodeSlot(2), NodeSlot(3)];
    pub const WORKER: [NodeSlot; 3] = [NodeSlot(4), NodeSlot(5), NodeSlot(6)];
}

impl fmt::Display for NodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Severity class of an anomaly indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Yellow,
    Red,
    RedFatal,
}

impl Severity {
    /// Parse a label class; unknown classes are unclassified and yield `None`
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "yellow" => Some(Severity::Yellow),
            "red" => Some(Severity::Red),
            "red_fatal" => Some(Severity::RedFatal),
            _ => None,
        }
    }
}

/// Derived per-row health label, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum HealthLabel {
    #[default]
    Green,
    Yellow,
    Red,
}

impl HealthLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Green => "green",
            HealthLabel::Yellow => "yellow",
            HealthLabel::Red => "red",
        }
    }

    /// Raise the label to `other` if it is more severe; never lowers it
    pub fn escalate(self, other: HealthLabel) -> HealthLabel {
        self.max(other)
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_type_literals() {
        assert_eq!("bool".parse::<SemanticType>().unwrap(), SemanticType::Bool);
        assert_eq!("Int64".parse::<SemanticType>().unwrap(), SemanticType::Int(64));
        assert_eq!("uint32".parse::<SemanticType>().unwrap(), SemanticType::UInt(32));
        assert_eq!("float32".parse::<SemanticType>().unwrap(), SemanticType::Float);
        assert_eq!("object".parse::<SemanticType>().unwrap(), SemanticType::String);
        assert_eq!(
            "datetime64[ns]".parse::<SemanticType>().unwrap(),
            SemanticType::DateTime
        );
        assert!("complex128".parse::<SemanticType>().is_err());
    }

    #[test]
    fn test_health_label_ordering() {
        assert!(HealthLabel::Green < HealthLabel::Yellow);
        assert!(HealthLabel::Yellow < HealthLabel::Red);
        assert_eq!(HealthLabel::Red.escalate(HealthLabel::Yellow), HealthLabel::Red);
        assert_eq!(HealthLabel::Green.escalate(HealthLabel::Yellow), HealthLabel::Yellow);
    }

    #[test]
    fn test_severity_classes() {
        assert_eq!(Severity::from_label("red_fatal"), Some(Severity::RedFatal));
        assert_eq!(Severity::from_label("blue"), None);
    }
}

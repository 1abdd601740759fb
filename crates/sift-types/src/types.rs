use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar values that working-memory triples can carry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// String value (symbols such as entity names and attributes)
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
}

// -------------------------------------------------------------------------------------------------
// Conversions between `Value` and `serde_json::Value`. These let embedding layers
// marshal facts from JSON payloads without hand-written mapping code.
// -------------------------------------------------------------------------------------------------

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Integer(i) => Self::Number(serde_json::Number::from(i)),
            Value::Float(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            Value::Boolean(b) => Self::Bool(b),
        }
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    return Err(anyhow!("Unsupported number value: {}", n));
                }
            }
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            other => return Err(anyhow!("Unsupported triple value: {}", other)),
        })
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state); // Use bits representation for consistent hashing
            }
            Self::Boolean(b) => {
                3u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl Value {
    /// Check if this value is "truthy" for conditional logic
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
        }
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// A named pattern variable, bound to values during matching
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(String);

impl Variable {
    /// Create a variable with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The variable's name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::borrow::Borrow<str> for Variable {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// The three fields of a triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// The identifier field
    Id,
    /// The attribute field
    Attr,
    /// The value field
    Value,
}

impl Slot {
    /// All slots, in field order
    pub const ALL: [Self; 3] = [Self::Id, Self::Attr, Self::Value];
}

/// A ground fact: an `(id, attr, value)` triple with structural equality
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Identifier field
    pub id: Value,
    /// Attribute field
    pub attr: Value,
    /// Value field
    pub value: Value,
}

impl Triple {
    /// Build a triple from anything convertible to values
    pub fn new(id: impl Into<Value>, attr: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self { id: id.into(), attr: attr.into(), value: value.into() }
    }

    /// Read one field by slot
    #[must_use]
    pub fn get(&self, slot: Slot) -> &Value {
        match slot {
            Slot::Id => &self.id,
            Slot::Attr => &self.attr,
            Slot::Value => &self.value,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.id, self.attr, self.value)
    }
}

/// One field of a triple pattern: either a constant or a variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternField {
    /// Must equal this constant
    Const(Value),
    /// Binds (or must agree with) this variable
    Var(Variable),
}

impl PatternField {
    /// The constant carried by this field, if any
    #[must_use]
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Self::Const(v) => Some(v),
            Self::Var(_) => None,
        }
    }

    /// The variable carried by this field, if any
    #[must_use]
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Self::Var(v) => Some(v),
            Self::Const(_) => None,
        }
    }
}

impl From<Variable> for PatternField {
    fn from(v: Variable) -> Self {
        Self::Var(v)
    }
}

impl From<Value> for PatternField {
    fn from(v: Value) -> Self {
        Self::Const(v)
    }
}

impl From<&str> for PatternField {
    fn from(s: &str) -> Self {
        Self::Const(Value::from(s))
    }
}

impl From<i64> for PatternField {
    fn from(i: i64) -> Self {
        Self::Const(Value::from(i))
    }
}

/// A triple template: constants discriminate in the alpha network, variables
/// bind during joins
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    /// Identifier field of the template
    pub id: PatternField,
    /// Attribute field of the template
    pub attr: PatternField,
    /// Value field of the template
    pub value: PatternField,
}

impl Pattern {
    /// Build a pattern from constants and variables
    pub fn new(
        id: impl Into<PatternField>,
        attr: impl Into<PatternField>,
        value: impl Into<PatternField>,
    ) -> Self {
        Self { id: id.into(), attr: attr.into(), value: value.into() }
    }

    /// Read one field by slot
    #[must_use]
    pub fn get(&self, slot: Slot) -> &PatternField {
        match slot {
            Slot::Id => &self.id,
            Slot::Attr => &self.attr,
            Slot::Value => &self.value,
        }
    }

    /// Variables of this pattern together with the slots they occupy,
    /// in field order
    pub fn variables(&self) -> impl Iterator<Item = (Slot, &Variable)> {
        Slot::ALL.into_iter().filter_map(|slot| self.get(slot).as_var().map(|v| (slot, v)))
    }

    /// Whether a triple satisfies the constant fields of this pattern
    #[must_use]
    pub fn matches_constants(&self, triple: &Triple) -> bool {
        Slot::ALL.into_iter().all(|slot| match self.get(slot) {
            PatternField::Const(v) => triple.get(slot) == v,
            PatternField::Var(_) => true,
        })
    }
}

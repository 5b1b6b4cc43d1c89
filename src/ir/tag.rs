//! Typed tag values.

use std::fmt;

use crate::error::PantierError;

/// Discriminant of a tag's value type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ValueType {
    #[default]
    Str,
    Int,
    Float,
    Bool,
}

impl ValueType {
    /// Short name used by the native XML format.
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Str => "str",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
        }
    }

    /// Parses a short type name; unknown names fall back to `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "str" | "string" => Some(ValueType::Str),
            "int" | "integer" => Some(ValueType::Int),
            "float" | "double" => Some(ValueType::Float),
            "bool" | "boolean" => Some(ValueType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value carried by a tag.
#[derive(Clone, Debug)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl TagValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TagValue::Str(_) => ValueType::Str,
            TagValue::Int(_) => ValueType::Int,
            TagValue::Float(_) => ValueType::Float,
            TagValue::Bool(_) => ValueType::Bool,
        }
    }
}

/// The unit of linguistic content: one typed value.
#[derive(Clone, Debug)]
pub struct Tag {
    value: TagValue,
}

impl Tag {
    /// Creates a tag by parsing `content` as `value_type`.
    pub fn new(content: &str, value_type: ValueType) -> Result<Self, PantierError> {
        let invalid = || PantierError::InvalidTagValue {
            content: content.to_string(),
            value_type: value_type.to_string(),
        };
        let trimmed = content.trim();
        let value = match value_type {
            ValueType::Str => TagValue::Str(content.to_string()),
            ValueType::Int => TagValue::Int(trimmed.parse().map_err(|_| invalid())?),
            ValueType::Float => {
                let v: f64 = trimmed.parse().map_err(|_| invalid())?;
                if !v.is_finite() {
                    return Err(invalid());
                }
                TagValue::Float(v)
            }
            ValueType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => TagValue::Bool(true),
                "false" | "0" => TagValue::Bool(false),
                _ => return Err(invalid()),
            },
        };
        Ok(Self { value })
    }

    /// Creates a string tag.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            value: TagValue::Str(content.into()),
        }
    }

    pub fn from_value(value: TagValue) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &TagValue {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    /// Renders the value as text.
    pub fn content(&self) -> String {
        match &self.value {
            TagValue::Str(s) => s.clone(),
            TagValue::Int(i) => i.to_string(),
            TagValue::Float(f) => f.to_string(),
            TagValue::Bool(b) => b.to_string(),
        }
    }

    /// True for a string tag with blank content.
    pub fn is_empty(&self) -> bool {
        matches!(&self.value, TagValue::Str(s) if s.trim().is_empty())
    }

    /// Compares two tags, folding case and whitespace unless `case_sensitive`.
    pub fn matches(&self, other: &Tag, case_sensitive: bool) -> bool {
        match (&self.value, &other.value) {
            (TagValue::Str(a), TagValue::Str(b)) => {
                if case_sensitive {
                    normalize_whitespace(a) == normalize_whitespace(b)
                } else {
                    fold(a) == fold(b)
                }
            }
            (TagValue::Int(a), TagValue::Int(b)) => a == b,
            (TagValue::Float(a), TagValue::Float(b)) => a == b,
            (TagValue::Bool(a), TagValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other, false)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

impl From<&str> for Tag {
    fn from(content: &str) -> Self {
        Tag::text(content)
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unicode-folded form: lowercase with collapsed whitespace.
fn fold(s: &str) -> String {
    normalize_whitespace(&s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_construction_validates_content() {
        assert!(matches!(
            Tag::new("42", ValueType::Int).unwrap().value(),
            TagValue::Int(42)
        ));
        assert!(Tag::new("4.2", ValueType::Int).is_err());
        assert!(Tag::new("yes", ValueType::Bool).is_err());
        assert_eq!(Tag::new("1", ValueType::Bool).unwrap().content(), "true");
        assert!(Tag::new("nan", ValueType::Float).is_err());
    }

    #[test]
    fn string_equality_is_folded() {
        assert_eq!(Tag::text("Hello  World"), Tag::text(" hello world"));
        assert!(!Tag::text("Hello").matches(&Tag::text("hello"), true));
        assert!(Tag::text("a  b").matches(&Tag::text("a b"), true));
    }

    #[test]
    fn different_types_never_match() {
        assert_ne!(Tag::text("1"), Tag::new("1", ValueType::Int).unwrap());
    }
}

use std::fmt;

use serde::de::SeqAccess;
use serde::de::Visitor;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Native kind of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionType {
    String,
    List,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::String => "string",
            OptionType::List => "list",
        }
    }
}

/// Either a single string or an ordered list of strings; never both.
///
/// Serializes untagged, so a map of `OptionValue` keeps each stored option's
/// native kind when used as an unmarshal destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    List(Vec<String>),
}

impl OptionValue {
    pub fn kind(&self) -> OptionType {
        match self {
            OptionValue::String(_) => OptionType::String,
            OptionValue::List(_) => OptionType::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(v) => Some(v),
            OptionValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            OptionValue::String(_) => None,
            OptionValue::List(v) => Some(v),
        }
    }

    /// Scalar equality for string options, membership for lists.
    pub fn matches(
        &self,
        value: &str,
    ) -> bool {
        match self {
            OptionValue::String(v) => v == value,
            OptionValue::List(values) => values.iter().any(|v| v == value),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(values: Vec<String>) -> Self {
        OptionValue::List(values)
    }
}

impl Serialize for OptionValue {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match self {
            OptionValue::String(v) => serializer.serialize_str(v),
            OptionValue::List(values) => values.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for OptionValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionValueVisitor;

        impl<'de> Visitor<'de> for OptionValueVisitor {
            type Value = OptionValue;

            fn expecting(
                &self,
                f: &mut fmt::Formatter,
            ) -> fmt::Result {
                f.write_str("a string or a list of strings")
            }

            fn visit_str<E: serde::de::Error>(
                self,
                v: &str,
            ) -> Result<OptionValue, E> {
                Ok(OptionValue::String(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(
                self,
                v: String,
            ) -> Result<OptionValue, E> {
                Ok(OptionValue::String(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<OptionValue, A::Error> {
                let mut values = Vec::new();
                while let Some(v) = seq.next_element::<String>()? {
                    values.push(v);
                }
                Ok(OptionValue::List(values))
            }
        }

        deserializer.deserialize_any(OptionValueVisitor)
    }
}

/// One option of a section. Identity is (section, name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciOption {
    pub name: String,
    pub value: OptionValue,
}

impl UciOption {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<OptionValue>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> OptionType {
        self.value.kind()
    }
}

/// Resolved reference to a section inside a loaded package.
///
/// Plain data: it addresses the section by name (native-generated for
/// anonymous sections) and is only usable through the package it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionRef {
    pub name: String,
    pub section_type: String,
    pub anonymous: bool,
}

impl SectionRef {
    pub fn new(
        name: impl Into<String>,
        section_type: impl Into<String>,
        anonymous: bool,
    ) -> Self {
        Self {
            name: name.into(),
            section_type: section_type.into(),
            anonymous,
        }
    }
}

/// Opaque handle of a package loaded into a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(pub u64);

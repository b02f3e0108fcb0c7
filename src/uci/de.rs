//! Option to record conversion.
//!
//! The destination's `Deserialize` impl drives the walk: every declared field
//! looks up the option of the same name. Absent options leave the zero value
//! behind. A stored kind that differs from the field's kind (list option into
//! a scalar field, or the reverse) is skipped unless strict kinds are on.
//!
//! Nested records share the section with their parent, so the destination's
//! whole field tree is collected first. A catch-all map skips every option a
//! record anywhere in that tree declares, and an optional nested record is
//! present when any option it declares is.

use std::cell::RefCell;
use std::collections::HashMap;
use std::str::FromStr;

use serde::de;
use serde::de::value::StrDeserializer;
use serde::de::DeserializeOwned;
use serde::de::DeserializeSeed;
use serde::de::IntoDeserializer;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::Visitor;
use serde::forward_to_deserialize_any;

use crate::errors::TypeError;
use crate::uci::OptionValue;
use crate::uci::UciOption;

/// Builds a record from the options of one section.
pub fn from_options<T: DeserializeOwned>(
    options: &[UciOption],
    strict_kinds: bool,
) -> Result<T, TypeError> {
    let schema = Schema::of::<T>();
    T::deserialize(SectionDeserializer {
        options,
        schema: &schema,
        strict_kinds,
    })
}

const MAX_NESTING: usize = 16;

/// Field names of a record type and of every record nested in it.
#[derive(Debug, Default)]
struct Schema {
    claimed: Vec<&'static str>,
    /// Declared fields of the record stored under a parent field.
    nested: HashMap<&'static str, &'static [&'static str]>,
}

impl Schema {
    fn of<T: DeserializeOwned>() -> Self {
        let schema = RefCell::new(Schema::default());
        // A shape the walk cannot fake stops it early; names seen so far stay.
        let _ = T::deserialize(ShapeWalker {
            schema: &schema,
            field: None,
            depth: 0,
        });
        schema.into_inner()
    }

    fn record(
        &mut self,
        field: Option<&'static str>,
        fields: &'static [&'static str],
    ) {
        for name in fields {
            if !self.claimed.contains(name) {
                self.claimed.push(*name);
            }
        }
        if let Some(field) = field {
            self.nested.entry(field).or_insert(fields);
        }
    }

    fn claims(
        &self,
        name: &str,
    ) -> bool {
        self.claimed.iter().any(|field| *field == name)
    }

    /// Whether the section holds any option read by the record under `field`.
    fn nested_present(
        &self,
        field: &str,
        options: &[UciOption],
        depth: usize,
    ) -> bool {
        if depth >= MAX_NESTING {
            return false;
        }
        match self.nested.get(field) {
            Some(fields) => fields.iter().any(|name| {
                lookup(options, name).is_some() || self.nested_present(name, options, depth + 1)
            }),
            None => false,
        }
    }
}

#[derive(Clone, Copy)]
enum Slot<'a> {
    Missing,
    Text(&'a str),
    List(&'a [String]),
}

impl<'a> Slot<'a> {
    fn of(value: Option<&'a OptionValue>) -> Self {
        match value {
            None => Slot::Missing,
            Some(OptionValue::String(v)) => Slot::Text(v),
            Some(OptionValue::List(v)) => Slot::List(v),
        }
    }
}

fn lookup<'a>(
    options: &'a [UciOption],
    name: &str,
) -> Option<&'a OptionValue> {
    options.iter().find(|o| o.name == name).map(|o| &o.value)
}

fn parse_bool(
    option: &str,
    text: &str,
) -> Result<bool, TypeError> {
    match text.trim() {
        "1" | "true" | "yes" | "on" | "enabled" => Ok(true),
        "0" | "false" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(TypeError::Parse {
            option: option.to_string(),
            value: text.to_string(),
            reason: "not a boolean".into(),
        }),
    }
}

fn parse_number<T>(
    option: &str,
    text: &str,
) -> Result<T, TypeError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.trim().parse::<T>().map_err(|e| TypeError::Parse {
        option: option.to_string(),
        value: text.to_string(),
        reason: e.to_string(),
    })
}

struct SectionDeserializer<'a> {
    options: &'a [UciOption],
    schema: &'a Schema,
    strict_kinds: bool,
}

impl<'de, 'a> de::Deserializer<'de> for SectionDeserializer<'a> {
    type Error = TypeError;

    fn deserialize_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        self.deserialize_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_map(StructAccess::new(self.options, fields, self.schema, self.strict_kinds))
    }

    fn deserialize_map<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_map(OptionsAccess::new(self.options, self.schema, self.strict_kinds))
    }

    fn deserialize_option<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct enum
        identifier ignored_any
    }
}

/// Walks the declared fields of a record, one option lookup per field.
struct StructAccess<'a> {
    options: &'a [UciOption],
    fields: std::slice::Iter<'static, &'static str>,
    schema: &'a Schema,
    current: Option<&'static str>,
    strict_kinds: bool,
}

impl<'a> StructAccess<'a> {
    fn new(
        options: &'a [UciOption],
        fields: &'static [&'static str],
        schema: &'a Schema,
        strict_kinds: bool,
    ) -> Self {
        Self {
            options,
            fields: fields.iter(),
            schema,
            current: None,
            strict_kinds,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for StructAccess<'a> {
    type Error = TypeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, TypeError> {
        match self.fields.next() {
            Some(&field) => {
                self.current = Some(field);
                let key: StrDeserializer<'_, TypeError> = field.into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, TypeError> {
        let option = self
            .current
            .take()
            .ok_or_else(|| TypeError::Custom("field value requested before its name".into()))?;

        seed.deserialize(ValueDeserializer {
            option,
            slot: Slot::of(lookup(self.options, option)),
            options: self.options,
            schema: self.schema,
            strict_kinds: self.strict_kinds,
        })
    }
}

/// Every option of the section not claimed by a declared field of any record
/// in the destination, with its native kind.
struct OptionsAccess<'a> {
    options: std::slice::Iter<'a, UciOption>,
    schema: &'a Schema,
    current: Option<&'a UciOption>,
    strict_kinds: bool,
}

impl<'a> OptionsAccess<'a> {
    fn new(
        options: &'a [UciOption],
        schema: &'a Schema,
        strict_kinds: bool,
    ) -> Self {
        Self {
            options: options.iter(),
            schema,
            current: None,
            strict_kinds,
        }
    }
}

impl<'de, 'a> MapAccess<'de> for OptionsAccess<'a> {
    type Error = TypeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, TypeError> {
        for option in self.options.by_ref() {
            if self.schema.claims(&option.name) {
                continue;
            }
            self.current = Some(option);
            let key: StrDeserializer<'_, TypeError> = option.name.as_str().into_deserializer();
            return seed.deserialize(key).map(Some);
        }
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, TypeError> {
        let option = self
            .current
            .take()
            .ok_or_else(|| TypeError::Custom("map value requested before its key".into()))?;

        seed.deserialize(ValueDeserializer {
            option: &option.name,
            slot: Slot::of(Some(&option.value)),
            options: &[],
            schema: self.schema,
            strict_kinds: self.strict_kinds,
        })
    }
}

struct ListAccess<'a> {
    option: &'a str,
    items: std::slice::Iter<'a, String>,
    schema: &'a Schema,
    strict_kinds: bool,
}

impl<'de, 'a> SeqAccess<'de> for ListAccess<'a> {
    type Error = TypeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, TypeError> {
        match self.items.next() {
            Some(item) => seed
                .deserialize(ValueDeserializer {
                    option: self.option,
                    slot: Slot::Text(item),
                    options: &[],
                    schema: self.schema,
                    strict_kinds: self.strict_kinds,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// One field's view of the section: the option it maps to plus the whole
/// section for nested records and maps.
struct ValueDeserializer<'a> {
    option: &'a str,
    slot: Slot<'a>,
    options: &'a [UciOption],
    schema: &'a Schema,
    strict_kinds: bool,
}

impl<'a> ValueDeserializer<'a> {
    /// Text of a string option; `None` when absent or stored as a list in
    /// lenient mode.
    fn text(&self) -> Result<Option<&'a str>, TypeError> {
        match self.slot {
            Slot::Missing => Ok(None),
            Slot::Text(text) => Ok(Some(text)),
            Slot::List(_) if self.strict_kinds => Err(TypeError::KindMismatch {
                option: self.option.to_string(),
                expected: "string",
                found: "list",
            }),
            Slot::List(_) => Ok(None),
        }
    }

    fn list(&self) -> Result<&'a [String], TypeError> {
        match self.slot {
            Slot::Missing => Ok(&[]),
            Slot::List(items) => Ok(items),
            Slot::Text(_) if self.strict_kinds => Err(TypeError::KindMismatch {
                option: self.option.to_string(),
                expected: "list",
                found: "string",
            }),
            Slot::Text(_) => Ok(&[]),
        }
    }

    fn unsupported(
        &self,
        kind: &'static str,
    ) -> TypeError {
        TypeError::Unsupported {
            option: self.option.to_string(),
            kind,
        }
    }
}

macro_rules! deserialize_number {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V: Visitor<'de>>(
            self,
            visitor: V,
        ) -> Result<V::Value, TypeError> {
            match self.text()? {
                Some(text) => visitor.$visit(parse_number::<$ty>(self.option, text)?),
                None => visitor.$visit(<$ty>::default()),
            }
        }
    };
}

impl<'de, 'a> de::Deserializer<'de> for ValueDeserializer<'a> {
    type Error = TypeError;

    fn deserialize_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        match self.slot {
            Slot::Missing => visitor.visit_none(),
            Slot::Text(text) => visitor.visit_str(text),
            Slot::List(items) => visitor.visit_seq(ListAccess {
                option: self.option,
                items: items.iter(),
                schema: self.schema,
                strict_kinds: self.strict_kinds,
            }),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        match self.text()? {
            Some(text) => visitor.visit_bool(parse_bool(self.option, text)?),
            None => visitor.visit_bool(false),
        }
    }

    deserialize_number!(deserialize_i8, visit_i8, i8);
    deserialize_number!(deserialize_i16, visit_i16, i16);
    deserialize_number!(deserialize_i32, visit_i32, i32);
    deserialize_number!(deserialize_i64, visit_i64, i64);
    deserialize_number!(deserialize_i128, visit_i128, i128);
    deserialize_number!(deserialize_u8, visit_u8, u8);
    deserialize_number!(deserialize_u16, visit_u16, u16);
    deserialize_number!(deserialize_u32, visit_u32, u32);
    deserialize_number!(deserialize_u64, visit_u64, u64);
    deserialize_number!(deserialize_u128, visit_u128, u128);
    deserialize_number!(deserialize_f32, visit_f32, f32);
    deserialize_number!(deserialize_f64, visit_f64, f64);

    fn deserialize_char<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        match self.text()? {
            None => visitor.visit_char('\0'),
            Some(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => visitor.visit_char(c),
                    _ => Err(TypeError::Parse {
                        option: self.option.to_string(),
                        value: text.to_string(),
                        reason: "expected a single character".into(),
                    }),
                }
            }
        }
    }

    fn deserialize_str<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_str(self.text()?.unwrap_or(""))
    }

    fn deserialize_string<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(
        self,
        _visitor: V,
    ) -> Result<V::Value, TypeError> {
        Err(self.unsupported("bytes"))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(
        self,
        _visitor: V,
    ) -> Result<V::Value, TypeError> {
        Err(self.unsupported("bytes"))
    }

    fn deserialize_option<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        match self.slot {
            Slot::Missing if self.schema.nested_present(self.option, self.options, 0) => {
                visitor.visit_some(self)
            }
            Slot::Missing => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        let items = self.list()?;
        visitor.visit_seq(ListAccess {
            option: self.option,
            items: items.iter(),
            schema: self.schema,
            strict_kinds: self.strict_kinds,
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, TypeError> {
        Err(self.unsupported("tuple"))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, TypeError> {
        Err(self.unsupported("tuple struct"))
    }

    fn deserialize_map<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_map(OptionsAccess::new(self.options, self.schema, self.strict_kinds))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        // nested records read from the same section
        visitor.visit_map(StructAccess::new(self.options, fields, self.schema, self.strict_kinds))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        match self.text()? {
            Some(text) => {
                let variant: StrDeserializer<'_, TypeError> = text.into_deserializer();
                visitor.visit_enum(variant)
            }
            None => Err(TypeError::Custom(format!(
                "option {:?} has no value for an enum field",
                self.option
            ))),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_unit()
    }
}

/// Walks a destination type with placeholder values, recording the fields of
/// every record it meets.
struct ShapeWalker<'s> {
    schema: &'s RefCell<Schema>,
    field: Option<&'static str>,
    depth: usize,
}

macro_rules! walk_placeholder {
    ($method:ident, $visit:ident, $value:expr) => {
        fn $method<V: Visitor<'de>>(
            self,
            visitor: V,
        ) -> Result<V::Value, TypeError> {
            visitor.$visit($value)
        }
    };
}

impl<'de, 's> de::Deserializer<'de> for ShapeWalker<'s> {
    type Error = TypeError;

    walk_placeholder!(deserialize_any, visit_str, "");
    walk_placeholder!(deserialize_bool, visit_bool, false);
    walk_placeholder!(deserialize_i8, visit_i8, 0);
    walk_placeholder!(deserialize_i16, visit_i16, 0);
    walk_placeholder!(deserialize_i32, visit_i32, 0);
    walk_placeholder!(deserialize_i64, visit_i64, 0);
    walk_placeholder!(deserialize_i128, visit_i128, 0);
    walk_placeholder!(deserialize_u8, visit_u8, 0);
    walk_placeholder!(deserialize_u16, visit_u16, 0);
    walk_placeholder!(deserialize_u32, visit_u32, 0);
    walk_placeholder!(deserialize_u64, visit_u64, 0);
    walk_placeholder!(deserialize_u128, visit_u128, 0);
    walk_placeholder!(deserialize_f32, visit_f32, 0.0);
    walk_placeholder!(deserialize_f64, visit_f64, 0.0);
    walk_placeholder!(deserialize_char, visit_char, ' ');
    walk_placeholder!(deserialize_str, visit_str, "");
    walk_placeholder!(deserialize_string, visit_str, "");
    walk_placeholder!(deserialize_identifier, visit_str, "");
    walk_placeholder!(deserialize_bytes, visit_bytes, &[]);
    walk_placeholder!(deserialize_byte_buf, visit_bytes, &[]);

    fn deserialize_option<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_seq(Nothing)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_seq(Nothing)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_seq(Nothing)
    }

    fn deserialize_map<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_map(Nothing)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        if self.depth >= MAX_NESTING {
            return Err(TypeError::Custom("records nested too deep".into()));
        }
        self.schema.borrow_mut().record(self.field, fields);
        visitor.visit_map(WalkFields {
            schema: self.schema,
            fields: fields.iter(),
            current: None,
            depth: self.depth + 1,
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        match variants.first() {
            Some(&variant) => visitor.visit_enum(WalkVariant { variant, walker: self }),
            None => Err(TypeError::Custom("enum without variants".into())),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_unit()
    }
}

struct WalkFields<'s> {
    schema: &'s RefCell<Schema>,
    fields: std::slice::Iter<'static, &'static str>,
    current: Option<&'static str>,
    depth: usize,
}

impl<'de, 's> MapAccess<'de> for WalkFields<'s> {
    type Error = TypeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, TypeError> {
        match self.fields.next() {
            Some(&field) => {
                self.current = Some(field);
                let key: StrDeserializer<'_, TypeError> = field.into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, TypeError> {
        seed.deserialize(ShapeWalker {
            schema: self.schema,
            field: self.current.take(),
            depth: self.depth,
        })
    }
}

/// Picks the first variant of an enum.
struct WalkVariant<'s> {
    variant: &'static str,
    walker: ShapeWalker<'s>,
}

impl<'de, 's> de::EnumAccess<'de> for WalkVariant<'s> {
    type Error = TypeError;
    type Variant = ShapeWalker<'s>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, ShapeWalker<'s>), TypeError> {
        let key: StrDeserializer<'_, TypeError> = self.variant.into_deserializer();
        Ok((seed.deserialize(key)?, self.walker))
    }
}

impl<'de, 's> de::VariantAccess<'de> for ShapeWalker<'s> {
    type Error = TypeError;

    fn unit_variant(self) -> Result<(), TypeError> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, TypeError> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        visitor.visit_seq(Nothing)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, TypeError> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}

/// Empty sequence and empty map.
struct Nothing;

impl<'de> SeqAccess<'de> for Nothing {
    type Error = TypeError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        _seed: T,
    ) -> Result<Option<T::Value>, TypeError> {
        Ok(None)
    }
}

impl<'de> MapAccess<'de> for Nothing {
    type Error = TypeError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        _seed: K,
    ) -> Result<Option<K::Value>, TypeError> {
        Ok(None)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        _seed: V,
    ) -> Result<V::Value, TypeError> {
        Err(TypeError::Custom("empty map has no values".into()))
    }
}

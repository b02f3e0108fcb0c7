//! Record to option conversion.
//!
//! Records are described by their `Serialize` impl, generated once per type by
//! the derive. Each field becomes one option; scalars render in canonical
//! text, sequences of scalars become lists, nested records and maps flatten
//! into the same section.

use serde::ser;
use serde::ser::Impossible;
use serde::Serialize;

use crate::errors::TypeError;
use crate::uci::OptionValue;

type Options = Vec<(String, OptionValue)>;

/// Converts a record (struct or map) into the options of one section, in
/// field order.
///
/// `None` at the top level yields no options.
pub fn to_options<T: Serialize + ?Sized>(record: &T) -> Result<Options, TypeError> {
    match record.serialize(FieldSerializer::new("<record>"))? {
        FieldValue::Skip => Ok(Vec::new()),
        FieldValue::Nested(options) => Ok(options),
        FieldValue::Scalar(_) => Err(unsupported("<record>", "scalar")),
        FieldValue::List(_) => Err(unsupported("<record>", "sequence")),
    }
}

enum FieldValue {
    Skip,
    Scalar(String),
    List(Vec<String>),
    Nested(Options),
}

fn unsupported(
    option: &str,
    kind: &'static str,
) -> TypeError {
    TypeError::Unsupported {
        option: option.to_string(),
        kind,
    }
}

struct FieldSerializer {
    option: String,
}

impl FieldSerializer {
    fn new(option: impl Into<String>) -> Self {
        Self {
            option: option.into(),
        }
    }

    fn scalar(
        self,
        v: impl ToString,
    ) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::Scalar(v.to_string()))
    }
}

impl ser::Serializer for FieldSerializer {
    type Ok = FieldValue;
    type Error = TypeError;

    type SerializeSeq = SeqCollector;
    type SerializeTuple = Impossible<FieldValue, TypeError>;
    type SerializeTupleStruct = Impossible<FieldValue, TypeError>;
    type SerializeTupleVariant = Impossible<FieldValue, TypeError>;
    type SerializeMap = MapCollector;
    type SerializeStruct = StructCollector;
    type SerializeStructVariant = Impossible<FieldValue, TypeError>;

    fn serialize_bool(
        self,
        v: bool,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(if v { "1" } else { "0" })
    }

    fn serialize_i8(
        self,
        v: i8,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_i16(
        self,
        v: i16,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_i32(
        self,
        v: i32,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_i64(
        self,
        v: i64,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_i128(
        self,
        v: i128,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_u8(
        self,
        v: u8,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_u16(
        self,
        v: u16,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_u32(
        self,
        v: u32,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_u64(
        self,
        v: u64,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_u128(
        self,
        v: u128,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_f32(
        self,
        v: f32,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_f64(
        self,
        v: f64,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_char(
        self,
        v: char,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_str(
        self,
        v: &str,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(v)
    }

    fn serialize_bytes(
        self,
        _v: &[u8],
    ) -> Result<FieldValue, TypeError> {
        Err(unsupported(&self.option, "bytes"))
    }

    fn serialize_none(self) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::Skip)
    }

    fn serialize_some<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> Result<FieldValue, TypeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::Skip)
    }

    fn serialize_unit_struct(
        self,
        _name: &'static str,
    ) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::Skip)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<FieldValue, TypeError> {
        self.scalar(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<FieldValue, TypeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<FieldValue, TypeError> {
        Err(unsupported(&self.option, "enum variant with data"))
    }

    fn serialize_seq(
        self,
        len: Option<usize>,
    ) -> Result<SeqCollector, TypeError> {
        Ok(SeqCollector {
            option: self.option,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(
        self,
        _len: usize,
    ) -> Result<Self::SerializeTuple, TypeError> {
        Err(unsupported(&self.option, "tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, TypeError> {
        Err(unsupported(&self.option, "tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, TypeError> {
        Err(unsupported(&self.option, "enum variant with data"))
    }

    fn serialize_map(
        self,
        _len: Option<usize>,
    ) -> Result<MapCollector, TypeError> {
        Ok(MapCollector {
            options: Vec::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<StructCollector, TypeError> {
        Ok(StructCollector {
            options: Vec::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, TypeError> {
        Err(unsupported(&self.option, "enum variant with data"))
    }
}

struct SeqCollector {
    option: String,
    items: Vec<String>,
}

impl ser::SerializeSeq for SeqCollector {
    type Ok = FieldValue;
    type Error = TypeError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), TypeError> {
        match value.serialize(FieldSerializer::new(self.option.as_str()))? {
            FieldValue::Scalar(item) => {
                self.items.push(item);
                Ok(())
            }
            FieldValue::Skip => Err(unsupported(&self.option, "empty sequence element")),
            FieldValue::List(_) => Err(unsupported(&self.option, "nested sequence")),
            FieldValue::Nested(_) => Err(unsupported(&self.option, "record in sequence")),
        }
    }

    fn end(self) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::List(self.items))
    }
}

struct StructCollector {
    options: Options,
}

impl ser::SerializeStruct for StructCollector {
    type Ok = FieldValue;
    type Error = TypeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), TypeError> {
        match value.serialize(FieldSerializer::new(key))? {
            FieldValue::Skip => {}
            FieldValue::Scalar(v) => self.options.push((key.to_string(), OptionValue::String(v))),
            FieldValue::List(v) => self.options.push((key.to_string(), OptionValue::List(v))),
            // nested records share the parent's section
            FieldValue::Nested(options) => self.options.extend(options),
        }
        Ok(())
    }

    fn end(self) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::Nested(self.options))
    }
}

struct MapCollector {
    options: Options,
    key: Option<String>,
}

impl ser::SerializeMap for MapCollector {
    type Ok = FieldValue;
    type Error = TypeError;

    fn serialize_key<T: Serialize + ?Sized>(
        &mut self,
        key: &T,
    ) -> Result<(), TypeError> {
        match key.serialize(FieldSerializer::new("<map key>"))? {
            FieldValue::Scalar(k) => {
                self.key = Some(k);
                Ok(())
            }
            _ => Err(unsupported("<map key>", "non-scalar map key")),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), TypeError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| TypeError::Custom("map value serialized before its key".into()))?;

        match value.serialize(FieldSerializer::new(key.as_str()))? {
            FieldValue::Skip => {}
            FieldValue::Scalar(v) => self.options.push((key, OptionValue::String(v))),
            FieldValue::List(v) => self.options.push((key, OptionValue::List(v))),
            FieldValue::Nested(_) => return Err(unsupported(&key, "record as map value")),
        }
        Ok(())
    }

    fn end(self) -> Result<FieldValue, TypeError> {
        Ok(FieldValue::Nested(self.options))
    }
}

//! Payload buffer for bus messages.
//!
//! The bus carries a table of named attributes. On the Rust side the table is
//! a JSON object; framed for transport it is a big-endian `u32` length
//! followed by the JSON text.

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::Error;
use crate::Result;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobBuf {
    fields: Map<String, Value>,
}

impl BlobBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the top level fields of `value`.
    ///
    /// `null` adds nothing; a string is parsed as JSON text; anything else is
    /// serialized first. The result must be a JSON object.
    pub fn add_json_from<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<()> {
        match serde_json::to_value(value)? {
            Value::Null => Ok(()),
            Value::String(text) => self.add_json_str(&text),
            other => self.merge(other),
        }
    }

    pub fn add_json_str(
        &mut self,
        text: &str,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let value: Value = serde_json::from_str(text)?;
        self.merge(value)
    }

    fn merge(
        &mut self,
        value: Value,
    ) -> Result<()> {
        match value {
            Value::Object(fields) => {
                self.fields.extend(fields);
                Ok(())
            }
            other => Err(Error::Validation(format!(
                "bus payload must be a JSON object, got {}",
                kind_name(&other)
            ))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }

    /// Length-prefixed frame: `u32` big-endian byte count, then JSON text.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.to_json().into_bytes();
        let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < LEN_PREFIX {
            return Err(Error::Validation("truncated bus frame header".into()));
        }
        let (head, body) = frame.split_at(LEN_PREFIX);
        let len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
        if body.len() != len {
            return Err(Error::Validation(format!(
                "bus frame announces {} bytes, carries {}",
                len,
                body.len()
            )));
        }

        let mut buf = BlobBuf::new();
        buf.merge(serde_json::from_slice(body)?)?;
        Ok(buf)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Constant byte sequences such as file signatures and sync words.

use crate::{
    bits::take,
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, ParseContext},
    text::TextEncoding,
    value::Value,
};

/// Expected constant. Decodes to whether the bytes matched; always encodes the
/// constant regardless of the tree value.
#[derive(Debug, Clone)]
pub struct Magic {
    name: String,
    data: Vec<u8>,
}

impl Magic {
    /// `data` is either raw bytes or a string taken as its UTF-8 bytes.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Magic {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Constant given as text in `encoding`, e.g. a UTF-16 signature.
    pub fn text(name: impl Into<String>, text: &str, encoding: TextEncoding) -> Result<Self, SchemaError> {
        let name = name.into();
        let Some(data) = encoding.encode(text) else {
            return Err(SchemaError::InvalidDefinition {
                reason: format!("{text:?} is not valid {encoding}"),
                name,
            });
        };
        Ok(Magic { name, data })
    }
}

impl Codec for Magic {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], _ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let actual = take(data, self.data.len(), &self.name)?;
        let matched = actual == self.data.as_slice();
        if !matched {
            debug!(field = %self.name, "magic mismatch");
        }
        Ok((Value::Bool(matched), self.data.len()))
    }

    fn encode(&self, _value: &Value, _ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        Ok(self.data.clone())
    }

    fn make_struct(&self) -> Value {
        Value::Bool(true)
    }
}

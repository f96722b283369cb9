//! Strings terminated by an arbitrary delimiter sequence.

use crate::{
    errors::{DecodeError, EncodeError, SchemaError},
    field::{Codec, EncodeContext, ParseContext, invalid_value},
    text::TextEncoding,
    transform::{Transform, backward, forward},
    value::Value,
};

/// Options of [`DelimString`].
#[derive(Debug, Clone)]
pub struct DelimOptions {
    pub delimiter: Vec<u8>,
    /// Keep the delimiter as part of the value. On encode the value must then
    /// already end with it; otherwise it is appended.
    pub inclusive: bool,
    pub encoding: TextEncoding,
    pub transform: Option<Transform>,
}

impl Default for DelimOptions {
    fn default() -> Self {
        DelimOptions {
            delimiter: b"\r\n".to_vec(),
            inclusive: false,
            encoding: TextEncoding::default(),
            transform: None,
        }
    }
}

/// Delimiter terminated string.
///
/// A buffer without the delimiter decodes to [`Value::Null`] and consumes
/// nothing; a null value encodes to nothing.
#[derive(Debug, Clone)]
pub struct DelimString {
    name: String,
    opts: DelimOptions,
}

impl DelimString {
    pub fn new(name: impl Into<String>, opts: DelimOptions) -> Result<Self, SchemaError> {
        let name = name.into();
        if opts.delimiter.is_empty() {
            return Err(SchemaError::EmptyDelimiter(name));
        }
        Ok(DelimString { name, opts })
    }
}

impl Codec for DelimString {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, data: &[u8], _ctx: &mut ParseContext) -> Result<(Value, usize), DecodeError> {
        let delimiter = &self.opts.delimiter;
        let Some(pos) = data.windows(delimiter.len()).position(|w| w == delimiter) else {
            trace!(field = %self.name, "delimiter not found");
            return Ok((Value::Null, 0));
        };

        let end = if self.opts.inclusive {
            pos + delimiter.len()
        } else {
            pos
        };
        let text = self
            .opts
            .encoding
            .decode(&data[..end])
            .ok_or_else(|| DecodeError::InvalidText {
                field: self.name.clone(),
                encoding: self.opts.encoding,
            })?;

        Ok((
            forward(self.opts.transform.as_ref(), Value::Text(text)),
            pos + delimiter.len(),
        ))
    }

    fn encode(&self, value: &Value, _ctx: &EncodeContext) -> Result<Vec<u8>, EncodeError> {
        let value = backward(self.opts.transform.as_ref(), value.clone());
        if value.is_null() {
            return Ok(Vec::new());
        }

        let text = value
            .as_str()
            .ok_or_else(|| invalid_value(&self.name, "text", &value))?;
        let mut out = self
            .opts
            .encoding
            .encode(text)
            .ok_or_else(|| EncodeError::InvalidText {
                field: self.name.clone(),
                encoding: self.opts.encoding,
            })?;

        if self.opts.inclusive {
            if !out.ends_with(&self.opts.delimiter) {
                return Err(EncodeError::MissingDelimiter(self.name.clone()));
            }
        } else {
            out.extend_from_slice(&self.opts.delimiter);
        }

        Ok(out)
    }

    fn make_struct(&self) -> Value {
        forward(self.opts.transform.as_ref(), Value::Text(String::new()))
    }
}

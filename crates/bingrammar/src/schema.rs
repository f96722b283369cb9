//! Schema: ordered list of codecs used to decode byte slices into records and
//! encode records back into bytes.

use std::sync::Arc;

use crate::{
    errors::{DecodeError, EncodeError},
    field::{Codec, EncodeContext, Endian, Iteration, ParseContext},
    value::{Record, Value},
};

static NULL: Value = Value::Null;

/// An ordered list of field codecs. Build one with [`Schema::new`] and
/// [`Schema::field`], then [`Schema::parse`] bytes or [`Schema::encode`] records.
///
/// Cloning a schema is cheap: codecs are shared.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Arc<dyn Codec>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field to the schema.
    pub fn field(mut self, codec: impl Codec + 'static) -> Self {
        self.fields.push(Arc::new(codec));
        self
    }

    /// Appends an already shared codec.
    pub fn shared(mut self, codec: Arc<dyn Codec>) -> Self {
        self.fields.push(codec);
        self
    }

    /// Codecs in definition order.
    pub fn fields(&self) -> &[Arc<dyn Codec>] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses `data` big-endian by default.
    pub fn parse(&self, data: &[u8]) -> Result<Record, DecodeError> {
        self.parse_with(data, Endian::Big)
    }

    /// Parses `data` with `endian` as the default byte order.
    pub fn parse_with(&self, data: &[u8], endian: Endian) -> Result<Record, DecodeError> {
        debug!(fields = self.fields.len(), bytes = data.len(), "parse");

        let (record, _consumed) = self.parse_scoped(data, None, endian)?;

        debug!(consumed = _consumed, "parse finished");
        Ok(record)
    }

    /// Encodes `record` big-endian by default.
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, EncodeError> {
        self.encode_with(record, Endian::Big)
    }

    /// Encodes `record` with `endian` as the default byte order.
    pub fn encode_with(&self, record: &Record, endian: Endian) -> Result<Vec<u8>, EncodeError> {
        debug!(fields = self.fields.len(), "encode");

        let out = self.encode_scoped(record.clone(), None, endian)?;

        debug!(bytes = out.len(), "encode finished");
        Ok(out)
    }

    /// Builds a record holding every field's default value.
    pub fn make_template(&self) -> Record {
        self.fields
            .iter()
            .map(|codec| (codec.name().to_string(), codec.make_struct()))
            .collect()
    }

    /// Runs the schema in a fresh context, as nested loop elements and selector
    /// branches do. Returns the record and the bytes consumed.
    pub(crate) fn parse_scoped(
        &self,
        data: &[u8],
        iteration: Option<Iteration>,
        endian: Endian,
    ) -> Result<(Record, usize), DecodeError> {
        let mut ctx = ParseContext::new(iteration, endian);
        let consumed = self.parse_into(data, &mut ctx)?;
        Ok((ctx.fields, consumed))
    }

    /// Runs the schema against an existing context, storing each value under
    /// its field name. Returns the bytes consumed.
    pub(crate) fn parse_into(&self, data: &[u8], ctx: &mut ParseContext) -> Result<usize, DecodeError> {
        let mut offset = 0;

        for codec in &self.fields {
            let slice = data.get(offset..).unwrap_or_default();
            let (value, size) = codec.parse(slice, ctx)?;

            trace!(field = codec.name(), offset, size, "decoded field");

            ctx.fields.insert(codec.name().to_string(), value);
            offset += size;
        }

        Ok(offset)
    }

    /// Two-phase encode of `fields`: every codec prepares, then every codec
    /// serializes, in schema order.
    pub(crate) fn encode_scoped(
        &self,
        fields: Record,
        iteration: Option<Iteration>,
        endian: Endian,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut ctx = EncodeContext::new(fields, iteration, endian);

        for codec in &self.fields {
            codec.prepare_encode(&mut ctx)?;
        }

        let mut out = Vec::new();
        for codec in &self.fields {
            let value = ctx.fields.get(codec.name()).unwrap_or(&NULL);
            let bytes = codec.encode(value, &ctx)?;

            trace!(field = codec.name(), offset = out.len(), size = bytes.len(), "encoded field");

            out.extend_from_slice(&bytes);
        }

        Ok(out)
    }
}

/// Parses `data` with `schema`. See [`Schema::parse_with`].
pub fn parse(schema: &Schema, data: &[u8], endian: Endian) -> Result<Record, DecodeError> {
    schema.parse_with(data, endian)
}

/// Encodes `record` with `schema`. See [`Schema::encode_with`].
pub fn encode(schema: &Schema, record: &Record, endian: Endian) -> Result<Vec<u8>, EncodeError> {
    schema.encode_with(record, endian)
}

/// Default record for `schema`. See [`Schema::make_template`].
pub fn make_template(schema: &Schema) -> Record {
    schema.make_template()
}

#[cfg(feature = "serde")]
impl TryFrom<crate::serde::SchemaDef> for Schema {
    type Error = crate::errors::SchemaError;

    fn try_from(value: crate::serde::SchemaDef) -> Result<Self, Self::Error> {
        value.fields.into_iter().try_fold(Schema::new(), |schema, def| {
            Ok(schema.shared(crate::serde::build_field(def)?))
        })
    }
}

//! Payload mappers
//!
//! A mapper is bound to one [`Metaclass`] and converts between [`Value`]s and
//! positional text. Its output is a header describing the slot layout,
//! followed by the payload:
//!
//! ```text
//! {name:string(3);age:s64(2)}Ana30
//! ```
//!
//! - leaf `kind(width)`: exactly `width` characters, space padded
//! - record `{name:shape;...}`: member slots in member order
//! - repeated `shape[max]`: zero-padded count, then `max` element slots
//! - optional `shape?`: `1`/`0` presence flag, then the inner slot
//!
//! Encoding measures the value first, so unfixed widths and occurrence counts
//! are the maximum over the value. Padding is not part of a text leaf: spaces
//! at the padded end of a string do not survive a round trip.
//!
//! [`read_metaclass`] rebuilds a metaclass from a header alone, for payloads
//! whose type is not known.

mod header;
mod layout;
mod leaf;
mod optional;
mod record;
mod repeated;

use std::fmt;

use shapr_abi::Value;

pub use header::{read_metaclass, ROOT};
pub use layout::{digits, Cursor, Layout};
pub use leaf::{
    builtin_codec, BoolCodec, CharCodec, LeafCodec, LeafMapper, NumberCodec, StringCodec,
};
pub use optional::OptionalMapper;
pub use record::RecordMapper;
pub use repeated::RepeatedMapper;

use crate::error::PayloadError;
use crate::limits::Limits;
use crate::metaclass::Metaclass;

/// Bidirectional converter for values of one metaclass.
pub trait PayloadMapper: Send + Sync + fmt::Debug {
    fn metaclass(&self) -> &Metaclass;

    /// Layout with only the sizes fixed by format hints.
    fn layout(&self) -> Layout;

    /// Grow `layout` so that `value` fits.
    fn measure(&self, value: &Value, layout: &mut Layout) -> Result<(), PayloadError>;

    fn write_header(&self, layout: &Layout, out: &mut String) -> Result<(), PayloadError>;

    /// Parse this mapper's part of a header.
    fn read_header(&self, cursor: &mut Cursor<'_>, limits: &Limits) -> Result<Layout, PayloadError>;

    fn write(&self, value: &Value, layout: &Layout, out: &mut String) -> Result<(), PayloadError>;

    fn read(&self, layout: &Layout, cursor: &mut Cursor<'_>) -> Result<Value, PayloadError>;

    /// Header and payload for `value`.
    fn encode(&self, value: &Value) -> Result<String, PayloadError> {
        let mut layout = self.layout();
        self.measure(value, &mut layout)?;

        let mut out = String::new();
        self.write_header(&layout, &mut out)?;
        self.write(value, &layout, &mut out)?;
        log::trace!("encoded `{}` into {} bytes", self.metaclass(), out.len());
        Ok(out)
    }

    fn decode(&self, text: &str) -> Result<Value, PayloadError> {
        self.decode_with_limits(text, &Limits::default())
    }

    fn decode_with_limits(&self, text: &str, limits: &Limits) -> Result<Value, PayloadError> {
        let len = text.chars().count();
        if len > limits.max_payload_len {
            return Err(PayloadError::LimitExceeded {
                what: "payload length",
                value: len,
                max: limits.max_payload_len,
            });
        }

        let mut cursor = Cursor::new(text);
        let layout = self.read_header(&mut cursor, limits)?;

        let expected = layout.width();
        let remaining = cursor.remaining_len();
        if remaining < expected {
            return Err(PayloadError::UnexpectedEnd {
                position: cursor.position() + remaining,
            });
        }
        if remaining > expected {
            return Err(PayloadError::TrailingInput {
                remaining: remaining - expected,
            });
        }

        let value = self.read(&layout, &mut cursor)?;
        cursor.finish()?;
        Ok(value)
    }
}

pub(crate) fn type_mismatch(metaclass: &Metaclass, expected: &str, value: &Value) -> PayloadError {
    PayloadError::TypeMismatch {
        member: metaclass.name().to_string(),
        expected: expected.to_string(),
        got: value.kind_name().to_string(),
    }
}

pub(crate) fn layout_mismatch(metaclass: &Metaclass) -> PayloadError {
    PayloadError::LayoutMismatch {
        member: metaclass.name().to_string(),
    }
}

//! Leaf codecs and the leaf mapper

use std::fmt::{self, Write};
use std::sync::Arc;

use shapr_abi::{Align, Value};

use super::layout::{pad, Cursor, Layout};
use super::{layout_mismatch, PayloadMapper};
use crate::error::{CodecError, PayloadError};
use crate::limits::Limits;
use crate::metaclass::{LeafKind, Metaclass};

/// Text conversion for one leaf kind.
///
/// `parse` receives the slot text with alignment padding removed (unless the
/// codec has a fixed width, in which case the slot is passed as is).
pub trait LeafCodec: Send + Sync + fmt::Debug {
    fn render(&self, value: &Value) -> Result<String, CodecError>;

    fn parse(&self, text: &str) -> Result<Value, CodecError>;

    /// Width every rendering has, if constant.
    fn fixed_width(&self) -> Option<usize> {
        None
    }

    /// Alignment used when the member's format does not choose one.
    fn align(&self) -> Align {
        Align::Left
    }
}

/// Codec for a built-in kind; `None` for custom kinds.
pub fn builtin_codec(kind: &LeafKind) -> Option<Arc<dyn LeafCodec>> {
    match kind {
        LeafKind::Bool => Some(Arc::new(BoolCodec)),
        LeafKind::Char => Some(Arc::new(CharCodec)),
        LeafKind::String => Some(Arc::new(StringCodec)),
        LeafKind::Custom(_) => None,
        numeric => Some(Arc::new(NumberCodec {
            kind: numeric.clone(),
        })),
    }
}

fn unexpected(expected: &str, value: &Value) -> CodecError {
    CodecError::Unexpected {
        expected: expected.to_string(),
        got: value.kind_name().to_string(),
    }
}

// ============================================================================
// Built-in codecs
// ============================================================================

/// `1` for true, `0` for false.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl LeafCodec for BoolCodec {
    fn render(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Bool(true) => Ok("1".to_string()),
            Value::Bool(false) => Ok("0".to_string()),
            other => Err(unexpected("bool", other)),
        }
    }

    fn parse(&self, text: &str) -> Result<Value, CodecError> {
        match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(CodecError::Invalid(other.to_string())),
        }
    }

    fn fixed_width(&self) -> Option<usize> {
        Some(1)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CharCodec;

impl LeafCodec for CharCodec {
    fn render(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::Char(c) => Ok(c.to_string()),
            other => Err(unexpected("char", other)),
        }
    }

    fn parse(&self, text: &str) -> Result<Value, CodecError> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Value::Char(c)),
            _ => Err(CodecError::Invalid(text.to_string())),
        }
    }

    fn fixed_width(&self) -> Option<usize> {
        Some(1)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl LeafCodec for StringCodec {
    fn render(&self, value: &Value) -> Result<String, CodecError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(unexpected("string", other)),
        }
    }

    fn parse(&self, text: &str) -> Result<Value, CodecError> {
        Ok(Value::String(text.to_string()))
    }
}

/// Decimal integers and floats, right-aligned.
#[derive(Debug, Clone)]
pub struct NumberCodec {
    kind: LeafKind,
}

impl LeafCodec for NumberCodec {
    fn render(&self, value: &Value) -> Result<String, CodecError> {
        Ok(match (&self.kind, value) {
            (LeafKind::U8, Value::U8(n)) => n.to_string(),
            (LeafKind::U16, Value::U16(n)) => n.to_string(),
            (LeafKind::U32, Value::U32(n)) => n.to_string(),
            (LeafKind::U64, Value::U64(n)) => n.to_string(),
            (LeafKind::S8, Value::S8(n)) => n.to_string(),
            (LeafKind::S16, Value::S16(n)) => n.to_string(),
            (LeafKind::S32, Value::S32(n)) => n.to_string(),
            (LeafKind::S64, Value::S64(n)) => n.to_string(),
            (LeafKind::F32, Value::F32(n)) => n.to_string(),
            (LeafKind::F64, Value::F64(n)) => n.to_string(),
            (kind, other) => return Err(unexpected(kind.name(), other)),
        })
    }

    fn parse(&self, text: &str) -> Result<Value, CodecError> {
        let text = text.trim_matches(' ');
        let parsed = match self.kind {
            LeafKind::U8 => text.parse().map(Value::U8).ok(),
            LeafKind::U16 => text.parse().map(Value::U16).ok(),
            LeafKind::U32 => text.parse().map(Value::U32).ok(),
            LeafKind::U64 => text.parse().map(Value::U64).ok(),
            LeafKind::S8 => text.parse().map(Value::S8).ok(),
            LeafKind::S16 => text.parse().map(Value::S16).ok(),
            LeafKind::S32 => text.parse().map(Value::S32).ok(),
            LeafKind::S64 => text.parse().map(Value::S64).ok(),
            LeafKind::F32 => text.parse().map(Value::F32).ok(),
            LeafKind::F64 => text.parse().map(Value::F64).ok(),
            _ => None,
        };
        parsed.ok_or_else(|| CodecError::Invalid(text.to_string()))
    }

    fn align(&self) -> Align {
        Align::Right
    }
}

// ============================================================================
// LeafMapper
// ============================================================================

/// Maps a single, required leaf to a fixed-width slot.
#[derive(Debug)]
pub struct LeafMapper {
    metaclass: Arc<Metaclass>,
    kind: LeafKind,
    codec: Arc<dyn LeafCodec>,
}

impl LeafMapper {
    pub fn new(metaclass: Arc<Metaclass>, kind: LeafKind, codec: Arc<dyn LeafCodec>) -> Self {
        Self {
            metaclass,
            kind,
            codec,
        }
    }

    fn align(&self) -> Align {
        self.metaclass
            .format()
            .align
            .unwrap_or_else(|| self.codec.align())
    }

    /// Slot width fixed by the codec or by a size hint.
    fn fixed_width(&self) -> Option<usize> {
        self.codec
            .fixed_width()
            .or_else(|| self.metaclass.format().size.map(|size| size as usize))
    }

    fn render(&self, value: &Value) -> Result<String, PayloadError> {
        self.codec.render(value).map_err(|err| self.codec_error(err))
    }

    fn codec_error(&self, err: CodecError) -> PayloadError {
        match err {
            CodecError::Unexpected { expected, got } => PayloadError::TypeMismatch {
                member: self.metaclass.name().to_string(),
                expected,
                got,
            },
            CodecError::Invalid(text) => PayloadError::InvalidLeaf {
                member: self.metaclass.name().to_string(),
                kind: self.kind.name().to_string(),
                text,
            },
        }
    }

    fn width<'l>(&self, layout: &'l Layout) -> Result<&'l usize, PayloadError> {
        match layout {
            Layout::Leaf { width } => Ok(width),
            _ => Err(layout_mismatch(&self.metaclass)),
        }
    }

    fn overflow(&self, needed: usize, available: usize) -> PayloadError {
        PayloadError::Overflow {
            member: self.metaclass.name().to_string(),
            needed,
            available,
        }
    }
}

impl PayloadMapper for LeafMapper {
    fn metaclass(&self) -> &Metaclass {
        &self.metaclass
    }

    fn layout(&self) -> Layout {
        Layout::Leaf {
            width: self.fixed_width().unwrap_or(0),
        }
    }

    fn measure(&self, value: &Value, layout: &mut Layout) -> Result<(), PayloadError> {
        let len = self.render(value)?.chars().count();
        let fixed = self.fixed_width();
        let Layout::Leaf { width } = layout else {
            return Err(layout_mismatch(&self.metaclass));
        };
        match fixed {
            Some(fixed) if len > fixed => return Err(self.overflow(len, fixed)),
            Some(_) => {}
            None => *width = (*width).max(len),
        }
        Ok(())
    }

    fn write_header(&self, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let width = self.width(layout)?;
        let _ = write!(out, "{}({})", self.kind, width);
        Ok(())
    }

    fn read_header(&self, cursor: &mut Cursor<'_>, limits: &Limits) -> Result<Layout, PayloadError> {
        let kind = cursor.identifier();
        if kind != self.kind.name() {
            return Err(PayloadError::HeaderMismatch {
                expected: format!("{} of kind {}", self.metaclass.name(), self.kind),
                found: kind.to_string(),
            });
        }
        cursor.expect('(')?;
        let width = cursor.number()?;
        cursor.expect(')')?;

        if width > limits.max_width {
            return Err(PayloadError::LimitExceeded {
                what: "leaf width",
                value: width,
                max: limits.max_width,
            });
        }
        if let Some(fixed) = self.fixed_width() {
            if width != fixed {
                return Err(PayloadError::HeaderMismatch {
                    expected: format!("{}({fixed})", self.kind),
                    found: format!("{}({width})", self.kind),
                });
            }
        }
        Ok(Layout::Leaf { width })
    }

    fn write(&self, value: &Value, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let width = *self.width(layout)?;
        let text = self.render(value)?;
        let len = text.chars().count();
        if len > width {
            return Err(self.overflow(len, width));
        }
        match self.align() {
            Align::Left => {
                out.push_str(&text);
                pad(out, width - len);
            }
            Align::Right => {
                pad(out, width - len);
                out.push_str(&text);
            }
        }
        Ok(())
    }

    fn read(&self, layout: &Layout, cursor: &mut Cursor<'_>) -> Result<Value, PayloadError> {
        let width = *self.width(layout)?;
        let slot = cursor.take(width)?;
        let text = if self.codec.fixed_width().is_some() {
            slot
        } else {
            match self.align() {
                Align::Left => slot.trim_end_matches(' '),
                Align::Right => slot.trim_start_matches(' '),
            }
        };
        self.codec.parse(text).map_err(|err| self.codec_error(err))
    }
}

//! Optional mapper

use std::sync::Arc;

use shapr_abi::Value;

use super::layout::{pad, Cursor, Layout};
use super::{layout_mismatch, type_mismatch, PayloadMapper};
use crate::error::PayloadError;
use crate::limits::Limits;
use crate::metaclass::Metaclass;

/// Maps an optional member as a `1`/`0` presence flag and the inner slot.
///
/// An absent value leaves the inner slot blank.
#[derive(Debug)]
pub struct OptionalMapper {
    metaclass: Arc<Metaclass>,
    inner: Arc<dyn PayloadMapper>,
}

impl OptionalMapper {
    pub fn new(metaclass: Arc<Metaclass>, inner: Arc<dyn PayloadMapper>) -> Self {
        Self { metaclass, inner }
    }

    fn inner_layout<'l>(&self, layout: &'l Layout) -> Result<&'l Layout, PayloadError> {
        match layout {
            Layout::Optional(inner) => Ok(&**inner),
            _ => Err(layout_mismatch(&self.metaclass)),
        }
    }
}

impl PayloadMapper for OptionalMapper {
    fn metaclass(&self) -> &Metaclass {
        &self.metaclass
    }

    fn layout(&self) -> Layout {
        Layout::Optional(Box::new(self.inner.layout()))
    }

    fn measure(&self, value: &Value, layout: &mut Layout) -> Result<(), PayloadError> {
        let Layout::Optional(inner) = layout else {
            return Err(layout_mismatch(&self.metaclass));
        };
        match value {
            Value::Option(None) => Ok(()),
            Value::Option(Some(present)) => self.inner.measure(present, inner),
            other => Err(type_mismatch(&self.metaclass, "option", other)),
        }
    }

    fn write_header(&self, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        self.inner.write_header(self.inner_layout(layout)?, out)?;
        out.push('?');
        Ok(())
    }

    fn read_header(&self, cursor: &mut Cursor<'_>, limits: &Limits) -> Result<Layout, PayloadError> {
        let inner = self.inner.read_header(cursor, limits)?;
        cursor.expect('?')?;
        Ok(Layout::Optional(Box::new(inner)))
    }

    fn write(&self, value: &Value, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let inner = self.inner_layout(layout)?;
        match value {
            Value::Option(None) => {
                out.push('0');
                pad(out, inner.width());
                Ok(())
            }
            Value::Option(Some(present)) => {
                out.push('1');
                self.inner.write(present, inner, out)
            }
            other => Err(type_mismatch(&self.metaclass, "option", other)),
        }
    }

    fn read(&self, layout: &Layout, cursor: &mut Cursor<'_>) -> Result<Value, PayloadError> {
        let inner = self.inner_layout(layout)?;
        let position = cursor.position();
        match cursor.next_char()? {
            '1' => Ok(Value::some(self.inner.read(inner, cursor)?)),
            '0' => {
                cursor.skip_blank(inner.width())?;
                Ok(Value::NONE)
            }
            flag => Err(PayloadError::MalformedPayload {
                position,
                reason: format!("expected presence flag, found {flag:?}"),
            }),
        }
    }
}

//! Repeated mapper

use std::fmt::Write;
use std::sync::Arc;

use shapr_abi::Value;

use super::layout::{digits, pad, Cursor, Layout};
use super::{layout_mismatch, type_mismatch, PayloadMapper};
use crate::error::PayloadError;
use crate::limits::Limits;
use crate::metaclass::Metaclass;

/// Maps a list as an occurrence count followed by `occurs` element slots.
///
/// The count is zero-padded to the digits of `occurs`; unused slots are
/// blank.
#[derive(Debug)]
pub struct RepeatedMapper {
    metaclass: Arc<Metaclass>,
    element: Arc<dyn PayloadMapper>,
}

impl RepeatedMapper {
    pub fn new(metaclass: Arc<Metaclass>, element: Arc<dyn PayloadMapper>) -> Self {
        Self { metaclass, element }
    }

    fn fixed_occurs(&self) -> Option<usize> {
        self.metaclass
            .format()
            .max_occurs
            .map(|max_occurs| max_occurs as usize)
    }

    fn items<'v>(&self, value: &'v Value) -> Result<&'v [Value], PayloadError> {
        match value {
            Value::List(items) => Ok(items.as_slice()),
            other => Err(type_mismatch(&self.metaclass, "list", other)),
        }
    }

    fn parts<'l>(&self, layout: &'l Layout) -> Result<(usize, &'l Layout), PayloadError> {
        match layout {
            Layout::Repeated { occurs, element } => Ok((*occurs, &**element)),
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

impl PayloadMapper for RepeatedMapper {
    fn metaclass(&self) -> &Metaclass {
        &self.metaclass
    }

    fn layout(&self) -> Layout {
        Layout::Repeated {
            occurs: self.fixed_occurs().unwrap_or(0),
            element: Box::new(self.element.layout()),
        }
    }

    fn measure(&self, value: &Value, layout: &mut Layout) -> Result<(), PayloadError> {
        let items = self.items(value)?;
        let fixed = self.fixed_occurs();
        let Layout::Repeated { occurs, element } = layout else {
            return Err(layout_mismatch(&self.metaclass));
        };
        match fixed {
            Some(max) if items.len() > max => return Err(self.overflow(items.len(), max)),
            Some(_) => {}
            None => *occurs = (*occurs).max(items.len()),
        }
        for item in items {
            self.element.measure(item, element)?;
        }
        Ok(())
    }

    fn write_header(&self, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let (occurs, element) = self.parts(layout)?;
        self.element.write_header(element, out)?;
        let _ = write!(out, "[{occurs}]");
        Ok(())
    }

    fn read_header(&self, cursor: &mut Cursor<'_>, limits: &Limits) -> Result<Layout, PayloadError> {
        let element = self.element.read_header(cursor, limits)?;
        cursor.expect('[')?;
        let occurs = cursor.number()?;
        cursor.expect(']')?;

        if occurs > limits.max_occurs {
            return Err(PayloadError::LimitExceeded {
                what: "occurrences",
                value: occurs,
                max: limits.max_occurs,
            });
        }
        if let Some(fixed) = self.fixed_occurs() {
            if occurs != fixed {
                return Err(PayloadError::HeaderMismatch {
                    expected: format!("{} with [{fixed}]", self.metaclass.name()),
                    found: format!("[{occurs}]"),
                });
            }
        }
        Ok(Layout::Repeated {
            occurs,
            element: Box::new(element),
        })
    }

    fn write(&self, value: &Value, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let items = self.items(value)?;
        let (occurs, element) = self.parts(layout)?;
        if items.len() > occurs {
            return Err(self.overflow(items.len(), occurs));
        }

        let _ = write!(out, "{:0width$}", items.len(), width = digits(occurs));
        for item in items {
            self.element.write(item, element, out)?;
        }
        pad(out, (occurs - items.len()) * element.width());
        Ok(())
    }

    fn read(&self, layout: &Layout, cursor: &mut Cursor<'_>) -> Result<Value, PayloadError> {
        let (occurs, element) = self.parts(layout)?;

        let position = cursor.position();
        let text = cursor.take(digits(occurs))?;
        let count = Some(text)
            .filter(|text| text.chars().all(|c| c.is_ascii_digit()))
            .and_then(|text| text.parse::<usize>().ok())
            .ok_or_else(|| PayloadError::MalformedPayload {
                position,
                reason: format!("invalid occurrence count {text:?}"),
            })?;
        if count > occurs {
            return Err(PayloadError::MalformedPayload {
                position,
                reason: format!("occurrence count {count} exceeds {occurs} slots"),
            });
        }

        let items = (0..count)
            .map(|_| self.element.read(element, cursor))
            .collect::<Result<Vec<_>, _>>()?;
        cursor.skip_blank((occurs - count) * element.width())?;
        Ok(Value::List(items))
    }
}

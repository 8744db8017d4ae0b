//! Record mapper

use std::sync::Arc;

use shapr_abi::Value;

use super::layout::{Cursor, Layout};
use super::{layout_mismatch, type_mismatch, PayloadMapper};
use crate::error::PayloadError;
use crate::limits::Limits;
use crate::metaclass::Metaclass;

/// Maps a record by delegating each member to its own mapper, in member order.
///
/// Encoding looks fields up by name, so a value may list them in any order;
/// fields the metaclass marks as skipped are dropped. Decoding always yields
/// the fields in member order.
#[derive(Debug)]
pub struct RecordMapper {
    metaclass: Arc<Metaclass>,
    members: Vec<Arc<dyn PayloadMapper>>,
}

impl RecordMapper {
    pub fn new(metaclass: Arc<Metaclass>, members: Vec<Arc<dyn PayloadMapper>>) -> Self {
        Self { metaclass, members }
    }

    /// Field values in member order.
    fn fields<'v>(&self, value: &'v Value) -> Result<Vec<&'v Value>, PayloadError> {
        let Value::Record(entries) = value else {
            return Err(type_mismatch(&self.metaclass, "record", value));
        };

        for (i, (name, _)) in entries.iter().enumerate() {
            if self.metaclass.member(name).is_none() && !self.metaclass.is_skipped(name) {
                return Err(PayloadError::UnknownField {
                    record: self.metaclass.name().to_string(),
                    field: name.clone(),
                });
            }
            if entries[..i].iter().any(|(earlier, _)| earlier == name) {
                return Err(PayloadError::DuplicateField {
                    record: self.metaclass.name().to_string(),
                    field: name.clone(),
                });
            }
        }

        self.members
            .iter()
            .map(|mapper| {
                let name = mapper.metaclass().name();
                entries
                    .iter()
                    .find(|(field, _)| field == name)
                    .map(|(_, value)| value)
                    .ok_or_else(|| PayloadError::MissingField {
                        record: self.metaclass.name().to_string(),
                        field: name.to_string(),
                    })
            })
            .collect()
    }

    fn slots<'l>(&self, layout: &'l Layout) -> Result<&'l [Layout], PayloadError> {
        match layout {
            Layout::Record { members } if members.len() == self.members.len() => {
                Ok(members.as_slice())
            }
            _ => Err(layout_mismatch(&self.metaclass)),
        }
    }
}

impl PayloadMapper for RecordMapper {
    fn metaclass(&self) -> &Metaclass {
        &self.metaclass
    }

    fn layout(&self) -> Layout {
        Layout::Record {
            members: self.members.iter().map(|mapper| mapper.layout()).collect(),
        }
    }

    fn measure(&self, value: &Value, layout: &mut Layout) -> Result<(), PayloadError> {
        let fields = self.fields(value)?;
        let slots = match layout {
            Layout::Record { members } if members.len() == self.members.len() => members,
            _ => return Err(layout_mismatch(&self.metaclass)),
        };
        for ((mapper, slot), field) in self.members.iter().zip(slots.iter_mut()).zip(fields) {
            mapper.measure(field, slot)?;
        }
        Ok(())
    }

    fn write_header(&self, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let slots = self.slots(layout)?;
        out.push('{');
        for (i, (mapper, slot)) in self.members.iter().zip(slots).enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(mapper.metaclass().name());
            out.push(':');
            mapper.write_header(slot, out)?;
        }
        out.push('}');
        Ok(())
    }

    fn read_header(&self, cursor: &mut Cursor<'_>, limits: &Limits) -> Result<Layout, PayloadError> {
        cursor.expect('{')?;
        let mut members = Vec::with_capacity(self.members.len());
        for (i, mapper) in self.members.iter().enumerate() {
            if i > 0 {
                cursor.expect(';')?;
            }
            let name = cursor.identifier();
            if name != mapper.metaclass().name() {
                return Err(PayloadError::HeaderMismatch {
                    expected: format!("member {}", mapper.metaclass().name()),
                    found: format!("member {name}"),
                });
            }
            cursor.expect(':')?;
            members.push(mapper.read_header(cursor, limits)?);
        }
        cursor.expect('}')?;
        Ok(Layout::Record { members })
    }

    fn write(&self, value: &Value, layout: &Layout, out: &mut String) -> Result<(), PayloadError> {
        let fields = self.fields(value)?;
        let slots = self.slots(layout)?;
        for ((mapper, slot), field) in self.members.iter().zip(slots).zip(fields) {
            mapper.write(field, slot, out)?;
        }
        Ok(())
    }

    fn read(&self, layout: &Layout, cursor: &mut Cursor<'_>) -> Result<Value, PayloadError> {
        let slots = self.slots(layout)?;
        let mut fields = Vec::with_capacity(self.members.len());
        for (mapper, slot) in self.members.iter().zip(slots) {
            let value = mapper.read(slot, cursor)?;
            fields.push((mapper.metaclass().name().to_string(), value));
        }
        Ok(Value::Record(fields))
    }
}

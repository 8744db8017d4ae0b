//! Metaclasses read back from payload headers
//!
//! A header fully describes the slot layout of its payload, so a payload can
//! be decoded without the type that produced it. Leaf kinds come from the
//! header; records are named after the member that holds them, and the root
//! is named `root`.

use super::layout::{Cursor, Layout};
use crate::error::PayloadError;
use crate::limits::Limits;
use crate::metaclass::{LeafKind, Metaclass};

/// Name of the root metaclass built from a header.
pub const ROOT: &str = "root";

/// Metaclass described by the header at the start of `text`.
///
/// Widths and occurrence counts belong to this one payload and are not kept
/// as format hints. The payload follows the header without a separator, so a
/// trailing `[n]` or `?` on the root is read as a suffix only when the rest
/// of the text then has exactly the width the header announces.
pub fn read_metaclass(text: &str, limits: &Limits) -> Result<Metaclass, PayloadError> {
    let len = text.chars().count();
    if len > limits.max_payload_len {
        return Err(PayloadError::LimitExceeded {
            what: "payload length",
            value: len,
            max: limits.max_payload_len,
        });
    }

    let mut cursor = Cursor::new(text);
    let parser = HeaderParser { limits };
    let (metaclass, _) = parser.root(&mut cursor)?;
    log::debug!("read metaclass `{metaclass}` from header");
    Ok(metaclass)
}

type Item = (Metaclass, Layout);

struct HeaderParser<'a> {
    limits: &'a Limits,
}

impl HeaderParser<'_> {
    fn root(&self, cursor: &mut Cursor<'_>) -> Result<Item, PayloadError> {
        let item = self.item(ROOT, cursor, 0)?;

        let mut candidates = vec![(cursor.clone(), None, false)];
        let mut repeated = cursor.clone();
        if let Ok(Some(occurs)) = self.occurs(&mut repeated) {
            candidates.push((repeated.clone(), Some(occurs), false));
            if repeated.expect('?').is_ok() {
                candidates.push((repeated, Some(occurs), true));
            }
        } else {
            let mut optional = cursor.clone();
            if optional.expect('?').is_ok() {
                candidates.push((optional, None, true));
            }
        }

        let fits = |(after, occurs, optional): &(Cursor<'_>, Option<usize>, bool)| {
            wrap(item.clone(), *occurs, *optional).1.width() == after.remaining_len()
        };
        let chosen = match candidates.iter().rposition(fits) {
            Some(index) => index,
            None => candidates.len() - 1,
        };
        let (after, occurs, optional) = candidates.swap_remove(chosen);
        *cursor = after;
        Ok(wrap(item, occurs, optional))
    }

    /// A record member: an item plus its suffixes.
    fn member(
        &self,
        name: &str,
        cursor: &mut Cursor<'_>,
        depth: usize,
    ) -> Result<Item, PayloadError> {
        let item = self.item(name, cursor, depth)?;
        let occurs = self.occurs(cursor)?;
        let optional = cursor.peek() == Some('?') && cursor.expect('?').is_ok();
        Ok(wrap(item, occurs, optional))
    }

    /// A leaf `kind(width)` or a record `{name:shape;...}`.
    fn item(
        &self,
        name: &str,
        cursor: &mut Cursor<'_>,
        depth: usize,
    ) -> Result<Item, PayloadError> {
        if depth > self.limits.max_depth {
            return Err(PayloadError::LimitExceeded {
                what: "nesting depth",
                value: depth,
                max: self.limits.max_depth,
            });
        }
        if cursor.peek() == Some('{') {
            return self.record(name, cursor, depth);
        }

        let position = cursor.position();
        let kind = cursor.identifier();
        if kind.is_empty() {
            return Err(malformed(position, "expected a leaf kind or '{'"));
        }
        cursor.expect('(')?;
        let width = cursor.number()?;
        cursor.expect(')')?;
        if width > self.limits.max_width {
            return Err(PayloadError::LimitExceeded {
                what: "leaf width",
                value: width,
                max: self.limits.max_width,
            });
        }
        Ok((
            Metaclass::leaf(name, LeafKind::from_name(kind)),
            Layout::Leaf { width },
        ))
    }

    fn record(
        &self,
        name: &str,
        cursor: &mut Cursor<'_>,
        depth: usize,
    ) -> Result<Item, PayloadError> {
        cursor.expect('{')?;
        let mut members: Vec<Metaclass> = Vec::new();
        let mut layouts = Vec::new();
        loop {
            let position = cursor.position();
            let member = cursor.identifier();
            if member.is_empty() {
                return Err(malformed(position, "expected a member name"));
            }
            if members.iter().any(|m| m.name() == member) {
                return Err(malformed(position, &format!("member `{member}` appears twice")));
            }
            cursor.expect(':')?;
            let (metaclass, layout) = self.member(member, cursor, depth + 1)?;
            members.push(metaclass);
            layouts.push(layout);

            match cursor.peek() {
                Some(';') => cursor.expect(';')?,
                _ => break,
            }
        }
        cursor.expect('}')?;
        Ok((
            Metaclass::record(name, name, members),
            Layout::Record { members: layouts },
        ))
    }

    /// An optional `[n]` suffix.
    fn occurs(&self, cursor: &mut Cursor<'_>) -> Result<Option<usize>, PayloadError> {
        if cursor.peek() != Some('[') {
            return Ok(None);
        }
        cursor.expect('[')?;
        let occurs = cursor.number()?;
        cursor.expect(']')?;
        if occurs > self.limits.max_occurs {
            return Err(PayloadError::LimitExceeded {
                what: "occurrences",
                value: occurs,
                max: self.limits.max_occurs,
            });
        }
        Ok(Some(occurs))
    }
}

fn wrap((metaclass, layout): Item, occurs: Option<usize>, optional: bool) -> Item {
    let (metaclass, layout) = match occurs {
        Some(occurs) => (
            metaclass.repeated(),
            Layout::Repeated {
                occurs,
                element: Box::new(layout),
            },
        ),
        None => (metaclass, layout),
    };
    if optional {
        (metaclass.optional(), Layout::Optional(Box::new(layout)))
    } else {
        (metaclass, layout)
    }
}

fn malformed(position: usize, reason: &str) -> PayloadError {
    PayloadError::MalformedHeader {
        position,
        reason: reason.to_string(),
    }
}

//! Slot layouts and the text cursor

use crate::error::PayloadError;

/// Resolved slot sizes for one payload.
///
/// A mapper's initial layout holds only the sizes fixed by format hints;
/// measuring a value grows the rest to fit. The header encodes the layout,
/// so a decoder knows every slot width before reading the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Leaf { width: usize },
    Record { members: Vec<Layout> },
    Repeated { occurs: usize, element: Box<Layout> },
    Optional(Box<Layout>),
}

impl Layout {
    /// Total payload characters of the slot.
    pub fn width(&self) -> usize {
        match self {
            Layout::Leaf { width } => *width,
            Layout::Record { members } => members
                .iter()
                .fold(0usize, |acc, member| acc.saturating_add(member.width())),
            Layout::Repeated { occurs, element } => {
                digits(*occurs).saturating_add(occurs.saturating_mul(element.width()))
            }
            Layout::Optional(inner) => inner.width().saturating_add(1),
        }
    }
}

/// Decimal digits needed to print `n`.
pub fn digits(n: usize) -> usize {
    let mut n = n / 10;
    let mut count = 1;
    while n > 0 {
        n /= 10;
        count += 1;
    }
    count
}

pub(crate) fn pad(out: &mut String, n: usize) {
    out.extend(std::iter::repeat(' ').take(n));
}

/// Character cursor over a header and payload.
///
/// Positions count characters, not bytes.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    text: &'a str,
    offset: usize,
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            offset: 0,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.text.len()
    }

    pub fn remaining(&self) -> &'a str {
        &self.text[self.offset..]
    }

    /// Remaining characters.
    pub fn remaining_len(&self) -> usize {
        self.remaining().chars().count()
    }

    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    pub fn next_char(&mut self) -> Result<char, PayloadError> {
        let c = self.peek().ok_or(PayloadError::UnexpectedEnd {
            position: self.position,
        })?;
        self.offset += c.len_utf8();
        self.position += 1;
        Ok(c)
    }

    /// Take exactly `n` characters.
    pub fn take(&mut self, n: usize) -> Result<&'a str, PayloadError> {
        let start = self.offset;
        let mut end = start;
        let mut chars = self.text[start..].chars();
        for taken in 0..n {
            let c = chars.next().ok_or(PayloadError::UnexpectedEnd {
                position: self.position + taken,
            })?;
            end += c.len_utf8();
        }
        self.offset = end;
        self.position += n;
        Ok(&self.text[start..end])
    }

    pub fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.offset += c.len_utf8();
            self.position += 1;
        }
        &self.text[start..self.offset]
    }

    /// Header token: letters, digits, `_` and `-`.
    pub fn identifier(&mut self) -> &'a str {
        self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// Header punctuation.
    pub fn expect(&mut self, expected: char) -> Result<(), PayloadError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.offset += c.len_utf8();
                self.position += 1;
                Ok(())
            }
            found => Err(PayloadError::MalformedHeader {
                position: self.position,
                reason: match found {
                    Some(c) => format!("expected '{expected}', found '{c}'"),
                    None => format!("expected '{expected}', found end of input"),
                },
            }),
        }
    }

    /// Header number.
    pub fn number(&mut self) -> Result<usize, PayloadError> {
        let position = self.position;
        let text = self.take_while(|c| c.is_ascii_digit());
        if text.is_empty() {
            return Err(PayloadError::MalformedHeader {
                position,
                reason: "expected a number".to_string(),
            });
        }
        text.parse().map_err(|_| PayloadError::MalformedHeader {
            position,
            reason: format!("number {text} is too large"),
        })
    }

    /// Consume `n` padding spaces.
    pub fn skip_blank(&mut self, n: usize) -> Result<(), PayloadError> {
        let position = self.position;
        let text = self.take(n)?;
        if let Some(offset) = text.chars().position(|c| c != ' ') {
            return Err(PayloadError::MalformedPayload {
                position: position + offset,
                reason: "expected padding".to_string(),
            });
        }
        Ok(())
    }

    pub fn finish(&self) -> Result<(), PayloadError> {
        match self.remaining_len() {
            0 => Ok(()),
            remaining => Err(PayloadError::TrailingInput { remaining }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_counts() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(1000), 4);
    }

    #[test]
    fn layout_widths() {
        let layout = Layout::Record {
            members: vec![
                Layout::Leaf { width: 3 },
                Layout::Optional(Box::new(Layout::Leaf { width: 2 })),
                Layout::Repeated {
                    occurs: 12,
                    element: Box::new(Layout::Leaf { width: 1 }),
                },
            ],
        };
        assert_eq!(layout.width(), 3 + 3 + (2 + 12));
    }

    #[test]
    fn cursor_counts_characters() {
        let mut cursor = Cursor::new("çaé12");
        assert_eq!(cursor.take(3).unwrap(), "çaé");
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.remaining_len(), 2);
        assert_eq!(cursor.number().unwrap(), 12);
        assert!(cursor.is_eof());
        assert!(cursor.finish().is_ok());
    }

    #[test]
    fn cursor_errors() {
        let mut cursor = Cursor::new("ab");
        assert_eq!(
            cursor.take(3),
            Err(PayloadError::UnexpectedEnd { position: 2 })
        );
        assert!(matches!(
            cursor.expect('{'),
            Err(PayloadError::MalformedHeader { position: 0, .. })
        ));

        let mut cursor = Cursor::new("  x");
        assert!(matches!(
            cursor.skip_blank(3),
            Err(PayloadError::MalformedPayload { position: 2, .. })
        ));

        let cursor = Cursor::new("left");
        assert_eq!(
            cursor.finish(),
            Err(PayloadError::TrailingInput { remaining: 4 })
        );
    }

    #[test]
    fn header_tokens() {
        let mut cursor = Cursor::new("first_name:string(12)");
        assert_eq!(cursor.identifier(), "first_name");
        cursor.expect(':').unwrap();
        assert_eq!(cursor.identifier(), "string");
        cursor.expect('(').unwrap();
        assert_eq!(cursor.number().unwrap(), 12);
        cursor.expect(')').unwrap();
        assert!(cursor.is_eof());
    }
}

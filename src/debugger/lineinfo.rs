//! Executable lines of a compiled chunk, read from its Lua 5.4 bytecode dump.
//!
//! A line is breakable when at least one instruction of the chunk, or of any
//! function nested in it, carries that line. Keyword-only lines such as
//! `else`, or the `end` of an `if`, produce no instruction and never raise a
//! line event.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

const SIGNATURE: &[u8] = b"\x1bLua";
const VERSION: u8 = 0x54;
const FORMAT: u8 = 0;
const CHECK_DATA: &[u8] = b"\x19\x93\r\n\x1a\n";

/// Delta marking an instruction whose line is stored in the absolute table.
const ABSOLUTE_LINE: i8 = -0x80;

const TAG_NIL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x11;
const TAG_INTEGER: u8 = 0x03;
const TAG_FLOAT: u8 = 0x13;
const TAG_SHORT_STRING: u8 = 0x04;
const TAG_LONG_STRING: u8 = 0x14;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineInfoError {
    #[error("not a Lua 5.4 bytecode dump")]
    BadHeader,

    #[error("bytecode ends early at offset {0}")]
    Truncated(usize),

    #[error("size field overflows at offset {0}")]
    Overflow(usize),

    #[error("unknown constant tag {tag:#04x} at offset {offset}")]
    BadConstant { tag: u8, offset: usize },

    #[error("instruction {0} has no absolute line entry")]
    MissingAbsoluteLine(usize),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, LineInfoError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(LineInfoError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LineInfoError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(LineInfoError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, count: usize, width: usize) -> Result<(), LineInfoError> {
        let len = count
            .checked_mul(width)
            .ok_or(LineInfoError::Overflow(self.pos))?;
        self.take(len).map(|_| ())
    }

    /// Variable-length size: 7 bits per byte, most significant first, the
    /// final byte flagged with 0x80.
    fn size(&mut self) -> Result<usize, LineInfoError> {
        let mut value: usize = 0;
        loop {
            let byte = self.byte()?;
            value = value
                .checked_mul(0x80)
                .ok_or(LineInfoError::Overflow(self.pos))?
                | usize::from(byte & 0x7f);
            if byte & 0x80 != 0 {
                return Ok(value);
            }
        }
    }

    /// Strings are stored as length + 1; zero means no string.
    fn skip_string(&mut self) -> Result<(), LineInfoError> {
        match self.size()? {
            0 => Ok(()),
            len => self.take(len - 1).map(|_| ()),
        }
    }
}

struct Widths {
    instruction: usize,
    integer: usize,
    number: usize,
}

/// Every line of `dump` that carries an instruction, nested functions
/// included.
pub fn active_lines(dump: &[u8]) -> Result<BTreeSet<usize>, LineInfoError> {
    let mut reader = Reader {
        bytes: dump,
        pos: 0,
    };
    let widths = read_header(&mut reader)?;
    // Upvalue count of the main closure.
    reader.byte()?;

    let mut lines = BTreeSet::new();
    read_function(&mut reader, &widths, &mut lines)?;
    Ok(lines)
}

fn read_header(reader: &mut Reader<'_>) -> Result<Widths, LineInfoError> {
    if reader.take(SIGNATURE.len())? != SIGNATURE
        || reader.byte()? != VERSION
        || reader.byte()? != FORMAT
        || reader.take(CHECK_DATA.len())? != CHECK_DATA
    {
        return Err(LineInfoError::BadHeader);
    }

    let widths = Widths {
        instruction: usize::from(reader.byte()?),
        integer: usize::from(reader.byte()?),
        number: usize::from(reader.byte()?),
    };
    // Check integer and check number.
    reader.take(widths.integer)?;
    reader.take(widths.number)?;
    Ok(widths)
}

fn read_function(
    reader: &mut Reader<'_>,
    widths: &Widths,
    lines: &mut BTreeSet<usize>,
) -> Result<(), LineInfoError> {
    reader.skip_string()?;
    let line_defined = reader.size()?;
    reader.size()?;
    reader.byte()?;
    let is_vararg = reader.byte()? != 0;
    reader.byte()?;

    let code = reader.size()?;
    reader.skip(code, widths.instruction)?;

    for _ in 0..reader.size()? {
        let offset = reader.pos;
        match reader.byte()? {
            TAG_NIL | TAG_FALSE | TAG_TRUE => {}
            TAG_INTEGER => reader.skip(1, widths.integer)?,
            TAG_FLOAT => reader.skip(1, widths.number)?,
            TAG_SHORT_STRING | TAG_LONG_STRING => reader.skip_string()?,
            tag => return Err(LineInfoError::BadConstant { tag, offset }),
        }
    }

    let upvalues = reader.size()?;
    reader.skip(upvalues, 3)?;

    for _ in 0..reader.size()? {
        read_function(reader, widths, lines)?;
    }

    let count = reader.size()?;
    let deltas = reader.take(count)?;
    let mut absolute = HashMap::new();
    for _ in 0..reader.size()? {
        let pc = reader.size()?;
        let line = reader.size()?;
        absolute.insert(pc, line);
    }
    for _ in 0..reader.size()? {
        reader.skip_string()?;
        reader.size()?;
        reader.size()?;
    }
    for _ in 0..reader.size()? {
        reader.skip_string()?;
    }

    // The vararg prologue runs before the first line event.
    let first = usize::from(is_vararg);
    let mut line = i64::try_from(line_defined).map_err(|_| LineInfoError::Overflow(reader.pos))?;
    for (pc, &raw) in deltas.iter().enumerate() {
        let delta = raw as i8;
        line = if delta == ABSOLUTE_LINE {
            let abs = absolute
                .get(&pc)
                .ok_or(LineInfoError::MissingAbsoluteLine(pc))?;
            i64::try_from(*abs).map_err(|_| LineInfoError::Overflow(reader.pos))?
        } else {
            line + i64::from(delta)
        };
        if pc >= first {
            if let Ok(active) = usize::try_from(line) {
                if active > 0 {
                    lines.insert(active);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn lines_of(source: &str) -> Vec<usize> {
        let lua = Lua::new();
        let chunk = lua.load(source).into_function().unwrap();
        active_lines(&chunk.dump(false)).unwrap().into_iter().collect()
    }

    #[test]
    fn test_keyword_only_lines_are_not_active() {
        let src = "function f(x)\n  if x then\n    return 1\n  else\n    return 2\n  end\nend";
        assert_eq!(lines_of(src), vec![1, 2, 3, 5, 7]);
    }

    #[test]
    fn test_blank_and_comment_lines() {
        let src = "local x = 1\n\n-- comment\nx = x + 1 -- trailing\n--[[ long\n  comment ]]\nreturn x";
        assert_eq!(lines_of(src), vec![1, 4, 7]);
    }

    #[test]
    fn test_stripped_dump_has_no_lines() {
        let lua = Lua::new();
        let chunk = lua.load("local a = 1\nreturn a").into_function().unwrap();
        assert!(active_lines(&chunk.dump(true)).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_foreign_data() {
        assert_eq!(active_lines(b"print('hi')"), Err(LineInfoError::BadHeader));
        assert!(matches!(
            active_lines(b"\x1bLua\x54\x00"),
            Err(LineInfoError::Truncated(_))
        ));
    }
}

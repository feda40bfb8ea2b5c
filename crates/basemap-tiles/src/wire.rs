//! Minimal protobuf wire format reader
//!
//! [`WireReader`] is a cursor over a byte range of a shared buffer. Nested messages are read
//! as sub-range cursors over the same buffer, so decoding never copies the payload.
//!
//! Every read is bounds checked against the cursor's end. Malformed framing never panics:
//! reads stop at the end of the range, and an unknown wire type moves the cursor to the end,
//! which unwinds all enclosing decode loops with whatever was read so far.

/// How the bytes of a field are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
    /// Groups (3, 4) and reserved values (6, 7)
    Unsupported(u32),
}

impl From<u32> for WireType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Varint,
            1 => Self::Fixed64,
            2 => Self::LengthDelimited,
            5 => Self::Fixed32,
            other => Self::Unsupported(other),
        }
    }
}

/// Cursor over `buffer[position..end]`
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> WireReader<'a> {
    /// Cursor over the whole buffer
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            end: buffer.len(),
        }
    }

    /// Whether any unread bytes remain
    #[inline]
    pub fn has_more(&self) -> bool {
        self.position < self.end
    }

    /// Bytes left before the end of this cursor's range
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.position
    }

    /// Advance by `count` bytes, stopping at the end of the range
    #[inline]
    fn advance(&mut self, count: u64) {
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        self.position = self.position.saturating_add(count).min(self.end);
    }

    /// Read a little-endian base-128 varint.
    ///
    /// Stops on the first byte without the continuation bit or at the end of the range.
    /// Bits beyond the 64th are dropped.
    pub fn read_varint(&mut self) -> u64 {
        let mut result = 0u64;
        let mut shift = 0u32;
        while self.position < self.end {
            let byte = self.buffer[self.position];
            self.position += 1;
            if shift < 64 {
                result |= u64::from(byte & 0x7F) << shift;
            }
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        result
    }

    /// Read a zigzag-encoded signed varint
    #[inline]
    pub fn read_signed_varint(&mut self) -> i32 {
        zigzag_decode(self.read_varint())
    }

    /// Read a field tag as `(field_number, wire_type)`
    #[inline]
    pub fn read_tag(&mut self) -> (u32, WireType) {
        let value = self.read_varint();
        ((value >> 3) as u32, WireType::from((value & 0x7) as u32))
    }

    /// Skip over a field of the given wire type without interpreting it.
    ///
    /// Unsupported wire types make the rest of the range unreadable, so the cursor jumps to
    /// the end.
    pub fn skip(&mut self, wire_type: WireType) {
        match wire_type {
            WireType::Varint => {
                self.read_varint();
            }
            WireType::Fixed64 => self.advance(8),
            WireType::LengthDelimited => {
                let len = self.read_varint();
                self.advance(len);
            }
            WireType::Fixed32 => self.advance(4),
            WireType::Unsupported(value) => {
                tracing::trace!("Unsupported wire type {}, skipping to end", value);
                self.position = self.end;
            }
        }
    }

    /// Read a length-delimited field as a cursor over exactly its bytes.
    ///
    /// A declared length running past the end is truncated to the end of this range.
    pub fn read_bytes(&mut self) -> WireReader<'a> {
        let len = self.read_varint();
        let start = self.position;
        self.advance(len);
        WireReader {
            buffer: self.buffer,
            position: start,
            end: self.position,
        }
    }

    /// Read a packed run of unsigned varints
    pub fn read_packed_varints(&mut self) -> Vec<u32> {
        let mut packed = self.read_bytes();
        let mut values = Vec::with_capacity(packed.remaining());
        while packed.has_more() {
            values.push(packed.read_varint() as u32);
        }
        values
    }

    /// Read a length-delimited field as text, replacing invalid UTF-8
    pub fn read_string(&mut self) -> String {
        let field = self.read_bytes();
        String::from_utf8_lossy(&field.buffer[field.position..field.end]).into_owned()
    }
}

/// Map a zigzag-encoded unsigned value back to a signed one
#[inline(always)]
pub fn zigzag_decode(value: u64) -> i32 {
    ((value >> 1) as i64 ^ -((value & 1) as i64)) as i32
}

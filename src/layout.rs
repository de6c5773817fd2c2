//! Layout resolution.
//!
//! Resolving a layout translates a list of [Field]s and a packet length into the byte
//! windows each field is read from. Two positions are tracked for every field:
//!
//! * The logical bit offset within the packet. Fields without an explicit offset follow
//!   the previous field; bits not covered by any field are assumed to be a leading header.
//! * The physical window start, which is a plain running sum of bit lengths in declaration
//!   order and is not affected by explicit offsets.
//!
//! The logical offset determines how a field's bits are masked out of its window, the
//! physical offset determines which bytes form the window.
use serde::Serialize;
use tracing::trace;

use crate::{Error, Field, Result};

/// Where a single field is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: String,
    /// Logical offset of the first bit of the field, relative to the packet start.
    pub bit_offset: usize,
    /// First byte of the field's window in the source buffer.
    pub start_byte: usize,
    /// Number of source bytes in the window.
    pub file_bytes: usize,
    /// Width of the integer that holds the window after extraction.
    pub container_bytes: usize,
}

impl FieldLayout {
    /// Bit position of the field within the first byte of its window.
    #[must_use]
    pub fn bit_in_window(&self) -> usize {
        self.bit_offset % 8
    }
}

/// Resolved field positions for one field list and packet length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub packet_len: usize,
    /// Index aligned with the fields used to resolve this layout.
    pub fields: Vec<FieldLayout>,
}

impl Layout {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Smallest power-of-two width that holds a window of `file_bytes`, e.g., 3 -> 4, 5 -> 8.
#[must_use]
pub fn container_width(file_bytes: usize) -> usize {
    file_bytes.next_power_of_two()
}

/// Number of bytes in a field's window. A field that starts mid-byte and runs past the
/// end of that byte gets one extra byte.
fn window_len(bit_offset: usize, bit_length: usize) -> usize {
    let mut n = bit_length.div_ceil(8);
    let bit = bit_offset % 8;
    if bit != 0 && bit_length > 8 - bit {
        n += 1;
    }
    n
}

fn overflow(what: &str) -> Error {
    Error::Layout(format!("{what} overflows the addressable bit range"))
}

/// Bit just past the end of `field` when placed at `bit_offset`.
fn end_bit(field: &Field, bit_offset: usize) -> Result<usize> {
    bit_offset
        .checked_add(field.bit_length())
        .ok_or_else(|| overflow(field.name()))
}

/// Resolve `fields` for a packet of `packet_len` bytes.
///
/// # Errors
/// [Error::Layout] if there are no fields, if fields without explicit offsets do not
/// exactly fill the packet, if the definition extends past the end of the packet, or if
/// any offset or length is too large to address.
pub fn resolve(fields: &[Field], packet_len: usize) -> Result<Layout> {
    let Some(first) = fields.first() else {
        return Err(Error::Layout("no fields to resolve".to_string()));
    };
    let packet_bits = packet_len
        .checked_mul(8)
        .ok_or_else(|| overflow("packet length"))?;
    let total_bits = fields
        .iter()
        .try_fold(0usize, |acc, f| acc.checked_add(f.bit_length()))
        .ok_or_else(|| overflow("sum of field lengths"))?;

    let mut counter = match first.bit_offset() {
        Some(offset) => offset,
        None => match packet_len.checked_sub(total_bits / 8) {
            Some(header_len) => header_len * 8,
            None => {
                return Err(Error::Layout(format!(
                    "packet definition larger than packet length by {} bits",
                    total_bits - packet_bits
                )))
            }
        },
    };
    let mut sequential = 0usize;
    let mut resolved = Vec::with_capacity(fields.len());

    for field in fields {
        let bit_length = field.bit_length();
        let bit_offset = match field.bit_offset() {
            None => {
                let offset = counter;
                counter = end_bit(field, offset)?;
                offset
            }
            // overlaps already defined bits; only moves the counter if it runs past it
            Some(offset) if offset < counter => {
                counter = counter.max(end_bit(field, offset)?);
                offset
            }
            // skips 0 or more undefined bits
            Some(offset) => {
                counter = end_bit(field, offset)?;
                offset
            }
        };

        let file_bytes = window_len(bit_offset, bit_length);
        resolved.push(FieldLayout {
            name: field.name().to_string(),
            bit_offset,
            start_byte: sequential / 8,
            file_bytes,
            container_bytes: container_width(file_bytes),
        });
        sequential += bit_length;
    }

    if fields.iter().all(|f| f.bit_offset().is_none()) {
        if counter != packet_bits {
            return Err(Error::Layout(format!(
                "field definition ({counter} bits) != packet length ({packet_bits} bits)"
            )));
        }
    } else if counter > packet_bits {
        return Err(Error::Layout(format!(
            "packet definition larger than packet length by {} bits",
            counter - packet_bits
        )));
    }

    trace!(packet_len, num_fields = resolved.len(), "resolved layout");

    Ok(Layout {
        packet_len,
        fields: resolved,
    })
}

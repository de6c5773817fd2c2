//! Byte window extraction and bit-field value decoding.
use std::fmt::Display;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::layout::{FieldLayout, Layout};
use crate::{ByteOrder, Error, Field, Kind, Result};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Uint(u64),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw window bytes of a fill field. Carries no meaning.
    Fill(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_fill(&self) -> bool {
        matches!(self, Value::Fill(_))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Fill(v) => write!(f, "fill[len={}]", v.len()),
        }
    }
}

/// Decoded field values in definition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, Value)>);

impl Fields {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Fields(Vec::with_capacity(capacity))
    }

    pub fn push<S: Into<String>>(&mut self, name: S, value: Value) {
        self.0.push((name.into(), value));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Value of `name` as an unsigned integer, if present and representable.
    #[must_use]
    pub fn get_uint(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Byte order used to extract every field of `fields`.
///
/// # Errors
/// [Error::Layout] if the fields do not all use the same byte order.
pub fn list_byte_order(fields: &[Field]) -> Result<ByteOrder> {
    let order = fields.first().map_or(ByteOrder::Big, Field::byte_order);
    if let Some(field) = fields.iter().find(|f| f.byte_order() != order) {
        return Err(Error::Layout(format!(
            "mixed byte order is not supported; {} is {} but the packet is {order}",
            field.name(),
            field.byte_order()
        )));
    }
    Ok(order)
}

fn ones(bits: usize) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// Ensures the bytes holding the field's bits are in `buf`. Trailing window bytes that hold
/// none of the field's bits may be missing.
fn check_bounds(buf: &[u8], layout: &FieldLayout, bit_length: usize) -> Result<()> {
    let minimum = layout.start_byte + (layout.bit_in_window() + bit_length).div_ceil(8);
    if buf.len() < minimum {
        return Err(Error::NotEnoughData {
            actual: buf.len(),
            minimum,
        });
    }
    Ok(())
}

/// Assemble the window for a field into an unsigned integer using `order`. Window bytes
/// beyond the end of `buf` read as zero.
///
/// # Errors
/// [Error::NotEnoughData] if `buf` does not contain all of the field's bits.
pub fn extract(
    buf: &[u8],
    layout: &FieldLayout,
    bit_length: usize,
    order: ByteOrder,
) -> Result<u128> {
    check_bounds(buf, layout, bit_length)?;
    let byte = |i: usize| u128::from(buf.get(layout.start_byte + i).copied().unwrap_or(0));

    let mut assembled = 0u128;
    match order {
        ByteOrder::Big => {
            for i in 0..layout.file_bytes {
                assembled = (assembled << 8) | byte(i);
            }
        }
        ByteOrder::Little => {
            for i in (0..layout.file_bytes).rev() {
                assembled = (assembled << 8) | byte(i);
            }
        }
    }
    Ok(assembled)
}

/// Mask and shift a field's bits out of its assembled window.
#[must_use]
pub fn mask_bits(assembled: u128, layout: &FieldLayout, bit_length: usize) -> u64 {
    let window_bits = layout.file_bytes * 8;
    let bit = layout.bit_in_window();
    let power = window_bits - bit;
    let shift = window_bits - (bit + bit_length);
    let mask = ones(power) & (ones(layout.container_bytes * 8) << shift);

    // at most bit_length <= 64 bits remain
    ((assembled & mask) >> shift) as u64
}

/// Two's complement interpretation of the low `bit_length` bits of `raw`.
#[must_use]
pub fn sign_extend(raw: u64, bit_length: usize) -> i64 {
    if bit_length >= 64 {
        return raw as i64;
    }
    let mask = (1u64 << bit_length) - 1;
    if raw & (1u64 << (bit_length - 1)) != 0 {
        (raw | !mask) as i64
    } else {
        (raw & mask) as i64
    }
}

fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };
    let exp = i32::from((bits >> 10) & 0x1f);
    let frac = f64::from(bits & 0x3ff);
    match exp {
        0 => sign * frac * 2f64.powi(-24),
        0x1f if frac == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    }
}

fn float_from_bits(raw: u64, bit_length: usize) -> f64 {
    match bit_length {
        16 => f16_to_f64(raw as u16),
        32 => f64::from(f32::from_bits(raw as u32)),
        _ => f64::from_bits(raw),
    }
}

/// Decode a numeric (uint, int, float) field from its assembled window.
///
/// # Errors
/// [Error::Layout] for str and fill fields, which are read from the buffer directly.
pub fn decode_value(assembled: u128, field: &Field, layout: &FieldLayout) -> Result<Value> {
    let raw = mask_bits(assembled, layout, field.bit_length());
    match field.kind() {
        Kind::Uint => Ok(Value::Uint(raw)),
        Kind::Int => Ok(Value::Int(sign_extend(raw, field.bit_length()))),
        Kind::Float => Ok(Value::Float(float_from_bits(raw, field.bit_length()))),
        Kind::Str | Kind::Fill => Err(Error::Layout(format!(
            "{} is a {} field and has no numeric value",
            field.name(),
            field.kind()
        ))),
    }
}

fn decode_field(buf: &[u8], field: &Field, layout: &FieldLayout, order: ByteOrder) -> Result<Value> {
    match field.kind() {
        Kind::Uint | Kind::Int | Kind::Float => {
            let assembled = extract(buf, layout, field.bit_length(), order)?;
            decode_value(assembled, field, layout)
        }
        Kind::Str => {
            let end = layout.start_byte + field.bit_length() / 8;
            match buf.get(layout.start_byte..end) {
                Some(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
                None => Err(Error::NotEnoughData {
                    actual: buf.len(),
                    minimum: end,
                }),
            }
        }
        Kind::Fill => {
            check_bounds(buf, layout, field.bit_length())?;
            let end = buf.len().min(layout.start_byte + layout.file_bytes);
            Ok(Value::Fill(buf[layout.start_byte..end].to_vec()))
        }
    }
}

/// Decode all `fields` from `buf` according to `layout`.
///
/// # Errors
/// [Error::Layout] for mixed byte orders or a layout not resolved for `fields`, and
/// [Error::NotEnoughData] if `buf` is too short for any field.
pub fn decode_fields(buf: &[u8], fields: &[Field], layout: &Layout) -> Result<Fields> {
    if fields.len() != layout.fields.len() {
        return Err(Error::Layout(format!(
            "layout has {} fields, definition has {}",
            layout.fields.len(),
            fields.len()
        )));
    }
    let order = list_byte_order(fields)?;

    let mut decoded = Fields::with_capacity(fields.len());
    for (field, field_layout) in fields.iter().zip(&layout.fields) {
        decoded.push(field.name(), decode_field(buf, field, field_layout, order)?);
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::resolve;

    fn window(bit_offset: usize, file_bytes: usize) -> FieldLayout {
        FieldLayout {
            name: "X".to_string(),
            bit_offset,
            start_byte: 0,
            file_bytes,
            container_bytes: file_bytes.next_power_of_two(),
        }
    }

    #[test]
    fn test_three_bits_at_offset_5_in_16_bit_window() {
        let layout = window(5, 2);
        let cases: [([u8; 2], u64); 5] = [
            ([0b0000_0101, 0xff], 0b101),
            ([0b1111_1010, 0x00], 0b010),
            ([0b0000_0111, 0x12], 0b111),
            ([0b1111_1000, 0xff], 0b000),
            ([0b0000_0001, 0x80], 0b001),
        ];
        for (dat, expected) in cases {
            let assembled = extract(&dat, &layout, 3, ByteOrder::Big).unwrap();
            assert_eq!(mask_bits(assembled, &layout, 3), expected, "{dat:?}");
        }
    }

    #[test]
    fn test_signed_three_bits() {
        let field = Field::int("X", 3).unwrap();
        let layout = window(0, 1);

        let zult = decode_value(u128::from(0b1110_0000u8), &field, &layout).unwrap();
        assert_eq!(zult, Value::Int(-1));
        let zult = decode_value(u128::from(0b0110_0000u8), &field, &layout).unwrap();
        assert_eq!(zult, Value::Int(3));
        let zult = decode_value(u128::from(0b1000_0000u8), &field, &layout).unwrap();
        assert_eq!(zult, Value::Int(-4));
    }

    #[test]
    fn test_decode_value_kinds() {
        let layout = window(0, 1);
        let assembled = u128::from(0b1010_0000u8);

        let field = Field::uint("X", 3).unwrap();
        assert_eq!(decode_value(assembled, &field, &layout).unwrap(), Value::Uint(5));

        for field in [Field::str("S", 8).unwrap(), Field::fill("F", 3).unwrap()] {
            let zult = decode_value(assembled, &field, &layout);
            assert!(matches!(zult, Err(Error::Layout(_))), "{zult:?}");
        }
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b111, 3), -1);
        assert_eq!(sign_extend(0b011, 3), 3);
        assert_eq!(sign_extend(0xffff, 16), -1);
        assert_eq!(sign_extend(0x7fff, 16), 32767);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_wide_fields_are_not_truncated_to_32_bits() {
        let dat = hex::decode("0123456789abcdef").unwrap();
        let fields = vec![Field::uint("WIDE", 64).unwrap()];
        let layout = resolve(&fields, 8).unwrap();
        let zult = decode_fields(&dat, &fields, &layout).unwrap();
        assert_eq!(zult.get_uint("WIDE"), Some(0x0123_4567_89ab_cdef));

        // 40 bits straddling into a 6 byte window
        let fields = vec![
            Field::uint("A", 4).unwrap(),
            Field::uint("B", 40).unwrap(),
            Field::uint("C", 4).unwrap(),
        ];
        let layout = resolve(&fields, 6).unwrap();
        assert_eq!(layout.get("B").unwrap().file_bytes, 6);
        let zult = decode_fields(&dat, &fields, &layout).unwrap();
        assert_eq!(zult.get_uint("A"), Some(0x0));
        assert_eq!(zult.get_uint("B"), Some(0x12_3456_789a));
        assert_eq!(zult.get_uint("C"), Some(0xb));
    }

    #[test]
    fn test_float_byte_order() {
        let dat = [0x3c, 0x00];
        let big = vec![Field::float("F", 16).unwrap()];
        let little = vec![Field::float("F", 16).unwrap().little_endian()];

        let layout = resolve(&big, 2).unwrap();
        let big = decode_fields(&dat, &big, &layout).unwrap();
        let little = decode_fields(&dat, &little, &layout).unwrap();

        assert_eq!(big.get("F"), Some(&Value::Float(1.0)));
        assert_ne!(big.get("F"), little.get("F"));
    }

    #[test]
    fn test_float32_and_float64() {
        let mut dat = 1.5f32.to_be_bytes().to_vec();
        dat.extend((-2.25f64).to_le_bytes());

        let fields = vec![Field::float("F32", 32).unwrap()];
        let layout = resolve(&fields, 4).unwrap();
        let zult = decode_fields(&dat[..4], &fields, &layout).unwrap();
        assert_eq!(zult.get("F32").and_then(Value::as_f64), Some(1.5));

        let fields = vec![Field::float("F64", 64).unwrap().little_endian()];
        let layout = resolve(&fields, 8).unwrap();
        let zult = decode_fields(&dat[4..], &fields, &layout).unwrap();
        assert_eq!(zult.get("F64").and_then(Value::as_f64), Some(-2.25));
    }

    #[test]
    fn test_f16() {
        assert_eq!(f16_to_f64(0x3c00), 1.0);
        assert_eq!(f16_to_f64(0xc000), -2.0);
        assert_eq!(f16_to_f64(0x7bff), 65504.0);
        assert_eq!(f16_to_f64(0x0001), 2f64.powi(-24));
        assert_eq!(f16_to_f64(0x7c00), f64::INFINITY);
        assert!(f16_to_f64(0x7e00).is_nan());
    }

    #[test]
    fn test_little_endian_uint() {
        let dat = [0x34, 0x12, 0x78, 0x56];
        let fields = vec![
            Field::uint("A", 16).unwrap().little_endian(),
            Field::int("B", 16).unwrap().little_endian(),
        ];
        let layout = resolve(&fields, 4).unwrap();
        let zult = decode_fields(&dat, &fields, &layout).unwrap();
        assert_eq!(zult.get_uint("A"), Some(0x1234));
        assert_eq!(zult.get("B"), Some(&Value::Int(0x5678)));
    }

    #[test]
    fn test_mixed_byte_order_rejected() {
        let fields = vec![
            Field::uint("A", 8).unwrap(),
            Field::uint("B", 8).unwrap().little_endian(),
        ];
        let layout = resolve(&fields, 2).unwrap();
        let zult = decode_fields(&[0, 0], &fields, &layout);
        assert!(matches!(zult, Err(Error::Layout(_))), "{zult:?}");
    }

    #[test]
    fn test_text_and_fill() {
        let dat = b"ABC\xff";
        let fields = vec![Field::str("NAME", 24).unwrap(), Field::fill("PAD", 8).unwrap()];
        let layout = resolve(&fields, 4).unwrap();
        let zult = decode_fields(dat, &fields, &layout).unwrap();

        assert_eq!(zult.get("NAME").and_then(Value::as_str), Some("ABC"));
        assert_eq!(zult.get("PAD"), Some(&Value::Fill(vec![0xff])));
        assert!(zult.get("PAD").unwrap().is_fill());
    }

    #[test]
    fn test_not_enough_data() {
        let fields = vec![Field::uint("A", 8).unwrap(), Field::uint("B", 16).unwrap()];
        let layout = resolve(&fields, 3).unwrap();
        let zult = decode_fields(&[1, 2], &fields, &layout);
        assert!(
            matches!(zult, Err(Error::NotEnoughData { actual: 2, minimum: 3 })),
            "{zult:?}"
        );
    }

    #[test]
    fn test_trailing_window_byte_may_be_missing() {
        // 20 bits at in-byte offset 4 get a 4 byte window but only need 3 bytes
        let layout = FieldLayout {
            name: "USEC".to_string(),
            bit_offset: 4,
            start_byte: 0,
            file_bytes: 4,
            container_bytes: 4,
        };
        let assembled = extract(&[0xf1, 0x23, 0x45], &layout, 20, ByteOrder::Big).unwrap();
        assert_eq!(mask_bits(assembled, &layout, 20), 0x12345);
    }

    #[test]
    fn test_fields_serialize_in_order() {
        let mut fields = Fields::default();
        fields.push("Z", Value::Uint(1));
        fields.push("A", Value::Int(-1));
        fields.push("M", Value::Text("x".to_string()));

        let s = serde_json::to_string(&fields).unwrap();
        assert_eq!(s, r#"{"Z":1,"A":-1,"M":"x"}"#);
        assert_eq!(fields.names().collect::<Vec<_>>(), vec!["Z", "A", "M"]);
    }
}

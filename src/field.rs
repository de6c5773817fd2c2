//! Field descriptors.
//!
//! A [Field] describes where a single value lives in a packet and how its bits are to be
//! interpreted. Fields are validated on construction and are immutable afterwards, which
//! is what makes it safe to cache resolved layouts per definition.
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Logical type of a field's bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Kind {
    /// Unsigned integer, up to 64 bits.
    Uint,
    /// Two's complement signed integer, up to 64 bits.
    Int,
    /// IEEE-754 binary16, binary32 or binary64.
    Float,
    /// Fixed width character data.
    Str,
    /// Bits that are present in the packet but carry no meaning.
    Fill,
}

impl Kind {
    const VALID: &'static str = "uint, int, float, str, fill";

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Uint => "uint",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Str => "str",
            Kind::Fill => "fill",
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uint" => Ok(Kind::Uint),
            "int" => Ok(Kind::Int),
            "float" => Ok(Kind::Float),
            "str" => Ok(Kind::Str),
            "fill" => Ok(Kind::Fill),
            _ => Err(Error::Config(format!(
                "data type set to {s:?}; must be one of {}",
                Self::VALID
            ))),
        }
    }
}

impl TryFrom<String> for Kind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Byte order used to assemble a field's bytes into a value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Big => f.write_str("big"),
            ByteOrder::Little => f.write_str("little"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "big" => Ok(ByteOrder::Big),
            "little" => Ok(ByteOrder::Little),
            _ => Err(Error::Config(format!(
                "byte order set to {s:?}; must be one of big, little"
            ))),
        }
    }
}

impl TryFrom<String> for ByteOrder {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A single field in a packet definition.
///
/// # Example
/// ```
/// use ccsds_fields::{ByteOrder, Field, Kind};
///
/// let apid = Field::new("HDR_APID", Kind::Uint, 11, Some(5), ByteOrder::Big).unwrap();
/// assert_eq!(apid.bit_offset(), Some(5));
///
/// let temp = Field::int("TEMP", 16).unwrap().little_endian();
/// assert_eq!(temp.byte_order(), ByteOrder::Little);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FieldConfig")]
pub struct Field {
    name: String,
    #[serde(rename = "type")]
    kind: Kind,
    bit_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bit_offset: Option<usize>,
    byte_order: ByteOrder,
}

/// Unvalidated form of a [Field] as it appears in configuration.
#[derive(Deserialize)]
struct FieldConfig {
    name: String,
    #[serde(rename = "type")]
    kind: Kind,
    bit_length: usize,
    #[serde(default)]
    bit_offset: Option<usize>,
    #[serde(default)]
    byte_order: ByteOrder,
}

impl TryFrom<FieldConfig> for Field {
    type Error = Error;

    fn try_from(c: FieldConfig) -> Result<Self> {
        Field::new(c.name, c.kind, c.bit_length, c.bit_offset, c.byte_order)
    }
}

impl Field {
    /// Create a validated field.
    ///
    /// # Errors
    /// [Error::Config] if the name is empty, `bit_length` is zero, or `bit_length` cannot
    /// be represented by `kind`.
    pub fn new<S: Into<String>>(
        name: S,
        kind: Kind,
        bit_length: usize,
        bit_offset: Option<usize>,
        byte_order: ByteOrder,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Config("field name must not be empty".to_string()));
        }
        if bit_length == 0 {
            return Err(Error::Config(format!(
                "{name}: bit length must be greater than 0"
            )));
        }
        match kind {
            Kind::Uint | Kind::Int if bit_length > 64 => {
                return Err(Error::Config(format!(
                    "{name}: {kind} fields are limited to 64 bits; got {bit_length}"
                )))
            }
            Kind::Float if !matches!(bit_length, 16 | 32 | 64) => {
                return Err(Error::Config(format!(
                    "{name}: float fields must be 16, 32, or 64 bits; got {bit_length}"
                )))
            }
            Kind::Str if bit_length % 8 != 0 => {
                return Err(Error::Config(format!(
                    "{name}: str fields must be a whole number of bytes; got {bit_length} bits"
                )))
            }
            _ => {}
        }

        Ok(Self::fixed(name, kind, bit_length, bit_offset, byte_order))
    }

    /// Construct without validation. Only for built-in definitions that are covered by
    /// tests.
    pub(crate) fn fixed<S: Into<String>>(
        name: S,
        kind: Kind,
        bit_length: usize,
        bit_offset: Option<usize>,
        byte_order: ByteOrder,
    ) -> Self {
        Field {
            name: name.into(),
            kind,
            bit_length,
            bit_offset,
            byte_order,
        }
    }

    /// Big-endian unsigned field with an automatic offset.
    ///
    /// # Errors
    /// See [Field::new].
    pub fn uint<S: Into<String>>(name: S, bit_length: usize) -> Result<Self> {
        Self::new(name, Kind::Uint, bit_length, None, ByteOrder::Big)
    }

    /// Big-endian signed field with an automatic offset.
    ///
    /// # Errors
    /// See [Field::new].
    pub fn int<S: Into<String>>(name: S, bit_length: usize) -> Result<Self> {
        Self::new(name, Kind::Int, bit_length, None, ByteOrder::Big)
    }

    /// Big-endian float field with an automatic offset.
    ///
    /// # Errors
    /// See [Field::new].
    pub fn float<S: Into<String>>(name: S, bit_length: usize) -> Result<Self> {
        Self::new(name, Kind::Float, bit_length, None, ByteOrder::Big)
    }

    /// Character field with an automatic offset.
    ///
    /// # Errors
    /// See [Field::new].
    pub fn str<S: Into<String>>(name: S, bit_length: usize) -> Result<Self> {
        Self::new(name, Kind::Str, bit_length, None, ByteOrder::Big)
    }

    /// Fill field with an automatic offset.
    ///
    /// # Errors
    /// See [Field::new].
    pub fn fill<S: Into<String>>(name: S, bit_length: usize) -> Result<Self> {
        Self::new(name, Kind::Fill, bit_length, None, ByteOrder::Big)
    }

    /// Same field, placed at an explicit bit offset.
    #[must_use]
    pub fn at(mut self, bit_offset: usize) -> Self {
        self.bit_offset = Some(bit_offset);
        self
    }

    /// Same field, assembled little-endian.
    #[must_use]
    pub fn little_endian(mut self) -> Self {
        self.byte_order = ByteOrder::Little;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// Explicit bit offset, or `None` if the offset is resolved from field order.
    #[must_use]
    pub fn bit_offset(&self) -> Option<usize> {
        self.bit_offset
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Field{{name={}, type={}, bit_length={}, bit_offset={:?}, byte_order={}}}",
            self.name, self.kind, self.bit_length, self.bit_offset, self.byte_order
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_field() {
        let field = Field::new("HDR_VER", Kind::Uint, 3, Some(0), ByteOrder::Big).unwrap();

        assert_eq!(field.name(), "HDR_VER");
        assert_eq!(field.kind(), Kind::Uint);
        assert_eq!(field.bit_length(), 3);
        assert_eq!(field.bit_offset(), Some(0));
        assert_eq!(field.byte_order(), ByteOrder::Big);
    }

    #[test]
    fn test_invalid_fields() {
        assert!(matches!(Field::uint("", 3), Err(Error::Config(_))));
        assert!(matches!(Field::uint("X", 0), Err(Error::Config(_))));
        assert!(matches!(Field::uint("X", 65), Err(Error::Config(_))));
        assert!(matches!(Field::int("X", 65), Err(Error::Config(_))));
        assert!(matches!(Field::float("X", 24), Err(Error::Config(_))));
        assert!(matches!(Field::str("X", 12), Err(Error::Config(_))));

        assert!(Field::fill("X", 200).is_ok());
        assert!(Field::uint("X", 64).is_ok());
        assert!(Field::float("X", 16).is_ok());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("uint".parse::<Kind>().unwrap(), Kind::Uint);
        assert_eq!("int".parse::<Kind>().unwrap(), Kind::Int);
        assert_eq!("float".parse::<Kind>().unwrap(), Kind::Float);
        assert_eq!("str".parse::<Kind>().unwrap(), Kind::Str);
        assert_eq!("fill".parse::<Kind>().unwrap(), Kind::Fill);
        assert!(matches!("double".parse::<Kind>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_byte_order_is_case_sensitive() {
        assert_eq!("little".parse::<ByteOrder>().unwrap(), ByteOrder::Little);
        assert!(matches!("BIG".parse::<ByteOrder>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize() {
        let field: Field = serde_json::from_str(
            r#"{"name": "HDR_APID", "type": "uint", "bit_length": 11, "bit_offset": 5}"#,
        )
        .unwrap();
        assert_eq!(field, Field::uint("HDR_APID", 11).unwrap().at(5));

        let field: Field = serde_json::from_str(
            r#"{"name": "T", "type": "float", "bit_length": 32, "byte_order": "little"}"#,
        )
        .unwrap();
        assert_eq!(field.byte_order(), ByteOrder::Little);
        assert_eq!(field.bit_offset(), None);
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        let bad = [
            r#"{"name": "X", "type": "double", "bit_length": 8}"#,
            r#"{"name": "X", "type": "uint", "bit_length": 8, "byte_order": "BIG"}"#,
            r#"{"name": "X", "type": "uint", "bit_length": "8"}"#,
            r#"{"name": "X", "type": "uint", "bit_length": 8, "bit_offset": "0"}"#,
            r#"{"name": 25, "type": "uint", "bit_length": 8}"#,
            r#"{"name": "X", "type": "uint", "bit_length": 0}"#,
        ];
        for s in bad {
            assert!(serde_json::from_str::<Field>(s).is_err(), "{s} should not parse");
        }
    }

    #[test]
    fn test_serialize() {
        let field = Field::int("T", 16).unwrap().little_endian();
        let v = serde_json::to_value(&field).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"name": "T", "type": "int", "bit_length": 16, "byte_order": "little"})
        );
    }
}

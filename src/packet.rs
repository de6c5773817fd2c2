use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decode::{decode_fields, Fields};
use crate::layout::{resolve, Layout};
use crate::{Error, Field, Result};

/// Number of bytes in a space packet that are not counted by the packet length field,
/// i.e., the 6 byte primary header plus the length field's minus-one convention.
pub const PACKET_LEN_OVERHEAD: usize = 7;

/// Offset of the 16-bit packet length field in the primary header.
const PACKET_LEN_FIELD_OFFSET: usize = 4;

/// Total length in bytes of the space packet starting at `buf[0]`, according to its
/// primary header packet length field.
///
/// # Errors
/// [Error::NotEnoughData] if `buf` is too short to contain the length field.
pub fn packet_len(buf: &[u8]) -> Result<usize> {
    let minimum = PACKET_LEN_FIELD_OFFSET + 2;
    if buf.len() < minimum {
        return Err(Error::NotEnoughData {
            actual: buf.len(),
            minimum,
        });
    }
    let len = u16::from_be_bytes([buf[PACKET_LEN_FIELD_OFFSET], buf[PACKET_LEN_FIELD_OFFSET + 1]]);
    Ok(len as usize + PACKET_LEN_OVERHEAD)
}

/// Resolved layouts by packet length. Definitions are immutable, so entries never go
/// stale.
#[derive(Debug, Default)]
struct LayoutCache(Mutex<HashMap<usize, Arc<Layout>>>);

impl Clone for LayoutCache {
    fn clone(&self) -> Self {
        let cache = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        LayoutCache(Mutex::new(cache.clone()))
    }
}

/// A named packet definition, i.e., the ordered list of fields making up one type of
/// packet.
///
/// # Example
/// ```
/// use ccsds_fields::{Field, PacketDef, Value};
///
/// let def = PacketDef::new(
///     "status",
///     vec![
///         Field::uint("HDR_VER", 3).unwrap().at(0),
///         Field::uint("HDR_TYPE", 1).unwrap().at(3),
///         Field::uint("HDR_SHDR", 1).unwrap().at(4),
///         Field::uint("HDR_APID", 11).unwrap().at(5),
///     ],
/// )
/// .unwrap();
///
/// let dat: &[u8] = &[0xd, 0x59, 0xd2, 0xab, 0x0, 0x1, 0xff, 0xff];
/// let fields = def.decode(dat).unwrap();
/// assert_eq!(fields.get_uint("HDR_APID"), Some(1369));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PacketDefConfig")]
pub struct PacketDef {
    name: String,
    fields: Vec<Field>,
    #[serde(skip)]
    layouts: LayoutCache,
}

#[derive(Deserialize)]
struct PacketDefConfig {
    name: String,
    fields: Vec<Field>,
}

impl TryFrom<PacketDefConfig> for PacketDef {
    type Error = Error;

    fn try_from(c: PacketDefConfig) -> Result<Self> {
        PacketDef::new(c.name, c.fields)
    }
}

impl PacketDef {
    /// Create a packet definition.
    ///
    /// # Errors
    /// [Error::Config] if `fields` is empty or contains duplicate names.
    pub fn new<S, I>(name: S, fields: I) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = Field>,
    {
        let name = name.into();
        let fields: Vec<Field> = fields.into_iter().collect();
        if fields.is_empty() {
            return Err(Error::Config(format!("{name}: no fields defined")));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name()) {
                return Err(Error::Config(format!(
                    "{name}: duplicate field name {}",
                    field.name()
                )));
            }
        }
        Ok(Self::fixed(name, fields))
    }

    /// Construct without validation. Only for built-in definitions that are covered by
    /// tests.
    pub(crate) fn fixed<S: Into<String>>(name: S, fields: Vec<Field>) -> Self {
        PacketDef {
            name: name.into(),
            fields,
            layouts: LayoutCache::default(),
        }
    }

    /// Load a definition from JSON of the form `{"name": ..., "fields": [...]}`.
    ///
    /// # Errors
    /// [Error::Json] if the JSON is invalid or any field fails validation.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Resolved layout for a packet of `packet_len` bytes. Layouts are computed once per
    /// length and shared afterwards.
    ///
    /// # Errors
    /// [Error::Layout] if the fields cannot be placed in `packet_len` bytes.
    pub fn layout(&self, packet_len: usize) -> Result<Arc<Layout>> {
        let mut cache = self.layouts.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(layout) = cache.get(&packet_len) {
            return Ok(Arc::clone(layout));
        }
        debug!(packet = %self.name, packet_len, "resolving layout");
        let layout = Arc::new(resolve(&self.fields, packet_len)?);
        cache.insert(packet_len, Arc::clone(&layout));
        Ok(layout)
    }

    /// Decode a packet of `packet_len` bytes starting at `buf[0]`.
    ///
    /// # Errors
    /// [Error::Layout] if the definition does not fit the packet or mixes byte orders,
    /// [Error::NotEnoughData] if `buf` is missing bytes for a field.
    pub fn decode_sized(&self, buf: &[u8], packet_len: usize) -> Result<Fields> {
        let layout = self.layout(packet_len)?;
        decode_fields(buf, &self.fields, &layout)
    }

    /// Decode the space packet starting at `buf[0]`. The packet length is taken from the
    /// packet length field of its primary header.
    ///
    /// # Errors
    /// See [PacketDef::decode_sized].
    pub fn decode(&self, buf: &[u8]) -> Result<Fields> {
        self.decode_sized(buf, packet_len(buf)?)
    }
}

impl Display for PacketDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PacketDef{{name={}, fields=[len={}]}}", self.name, self.fields.len())
    }
}

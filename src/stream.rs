use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::header::{primary_header, APID_FIELD, LENGTH_FIELD};
use crate::packet::PACKET_LEN_OVERHEAD;
use crate::{Apid, Error, Fields, PacketDef, Result};

/// Packet definitions by APID.
///
/// In JSON an `ApidTable` is an object keyed by APID:
/// ```
/// use ccsds_fields::ApidTable;
///
/// let json = r#"{
///     "100": {"name": "hk", "fields": [
///         {"name": "HEADER", "type": "fill", "bit_length": 128},
///         {"name": "TEMP", "type": "int", "bit_length": 16}
///     ]}
/// }"#;
/// let table = ApidTable::from_json(json.as_bytes()).unwrap();
/// assert_eq!(table.get(100).unwrap().name(), "hk");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApidTable(HashMap<Apid, PacketDef>);

impl ApidTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from JSON. See [ApidTable].
    ///
    /// # Errors
    /// [Error::Json] if the JSON is invalid or any definition fails validation.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Add or replace the definition for `apid`, returning the replaced definition.
    pub fn insert(&mut self, apid: Apid, def: PacketDef) -> Option<PacketDef> {
        self.0.insert(apid, def)
    }

    #[must_use]
    pub fn get(&self, apid: Apid) -> Option<&PacketDef> {
        self.0.get(&apid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Apid, &PacketDef)> {
        self.0.iter()
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

impl FromIterator<(Apid, PacketDef)> for ApidTable {
    fn from_iter<T: IntoIterator<Item = (Apid, PacketDef)>>(iter: T) -> Self {
        ApidTable(iter.into_iter().collect())
    }
}

/// A packet decoded by a [StreamParser].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPacket {
    /// Name of the [PacketDef] used to decode the packet.
    pub name: String,
    pub apid: Apid,
    /// Byte offset of the start of the packet in the stream.
    pub offset: usize,
    pub fields: Fields,
}

/// Decodes a buffer containing a sequence of space packets of possibly different types.
///
/// Each packet's header is decoded first. The header's APID selects the definition
/// used to decode the packet and the header's packet length determines where the next
/// packet starts. Decoding stops at the end of the buffer or at the first error.
///
/// # Example
/// ```
/// use ccsds_fields::{ApidTable, Field, PacketDef, StreamParser};
///
/// let mut apids = ApidTable::new();
/// apids.insert(
///     1369,
///     PacketDef::new(
///         "cris",
///         vec![Field::fill("HEADER", 128).unwrap(), Field::uint("DATA", 8).unwrap()],
///     )
///     .unwrap(),
/// );
///
/// #[rustfmt::skip]
/// let dat = vec![
///     0xd, 0x59, 0xd2, 0xab, 0x0, 0xa,
///     0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0, 0x0,
///     0x2a,
/// ];
/// let mut parser = StreamParser::new(apids, dat);
///
/// let packet = parser.read_one().unwrap().unwrap();
/// assert_eq!(packet.name, "cris");
/// assert_eq!(packet.fields.get_uint("DATA"), Some(42));
/// assert!(parser.read_one().unwrap().is_none());
/// ```
#[derive(TypedBuilder)]
pub struct StreamParser {
    /// Body definitions by APID.
    apids: ApidTable,
    /// Packet stream bytes.
    #[builder(default, setter(into))]
    data: Vec<u8>,
    /// Definition used to decode each packet's header.
    #[builder(default = primary_header())]
    header: PacketDef,
    /// Header field holding the APID.
    #[builder(default = APID_FIELD.to_string(), setter(into))]
    apid_field: String,
    /// Header field holding the packet length minus 7.
    #[builder(default = LENGTH_FIELD.to_string(), setter(into))]
    length_field: String,
    #[builder(default, setter(skip))]
    offset: usize,
    #[builder(default, setter(skip))]
    failed: bool,
}

fn header_uint(header: &Fields, name: &str) -> Result<u64> {
    header
        .get_uint(name)
        .ok_or_else(|| Error::Layout(format!("header has no unsigned field {name}")))
}

impl StreamParser {
    /// Parser for `data` using the default primary header.
    pub fn new<D: Into<Vec<u8>>>(apids: ApidTable, data: D) -> Self {
        Self::builder().apids(apids).data(data).build()
    }

    /// Parser for all the bytes available from `reader`.
    ///
    /// # Errors
    /// [Error::Io] if reading fails.
    pub fn from_reader<R: Read>(apids: ApidTable, mut reader: R) -> Result<Self> {
        let mut data = Vec::default();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(apids, data))
    }

    /// Byte offset of the next packet.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn apids(&self) -> &ApidTable {
        &self.apids
    }

    /// Start over from the beginning of the current data.
    pub fn reset(&mut self) {
        debug!(len = self.data.len(), "resetting stream");
        self.offset = 0;
        self.failed = false;
    }

    /// Start over with new data.
    pub fn reset_with<D: Into<Vec<u8>>>(&mut self, data: D) {
        self.data = data.into();
        self.reset();
    }

    /// Decode the next packet, or `None` at the end of the data.
    ///
    /// # Errors
    /// [Error::UnknownApid] if there is no definition for a packet's APID. Any layout or
    /// decode error for the header or body definitions. The offset is not advanced on
    /// error.
    ///
    /// The header is decoded from the rest of the buffer. The body only sees the bytes
    /// of its own packet, so a body field whose window runs past the packet's declared
    /// length is [Error::NotEnoughData] even when more packets follow.
    pub fn read_one(&mut self) -> Result<Option<DecodedPacket>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let offset = self.offset;
        let buf = &self.data[offset..];

        let header = self.header.decode(buf)?;
        let apid = header_uint(&header, &self.apid_field)?;
        let apid = Apid::try_from(apid)
            .map_err(|_| Error::Layout(format!("APID {apid} out of range")))?;
        let Some(def) = self.apids.get(apid) else {
            warn!(apid, offset, "no definition for APID");
            return Err(Error::UnknownApid(apid));
        };

        let packet_len = header_uint(&header, &self.length_field)? as usize + PACKET_LEN_OVERHEAD;
        let fields = def.decode_sized(&buf[..buf.len().min(packet_len)], packet_len)?;
        trace!(apid, offset, packet_len, name = def.name(), "decoded packet");

        let packet = DecodedPacket {
            name: def.name().to_string(),
            apid,
            offset,
            fields,
        };
        self.offset += packet_len;
        Ok(Some(packet))
    }
}

impl Iterator for StreamParser {
    type Item = Result<DecodedPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_one() {
            Ok(packet) => packet.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl Debug for StreamParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParser")
            .field("apids", &self.apids.len())
            .field("len", &self.data.len())
            .field("offset", &self.offset)
            .field("header", &self.header.name())
            .finish_non_exhaustive()
    }
}

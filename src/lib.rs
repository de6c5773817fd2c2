#![doc = include_str!("../README.md")]

mod decode;
mod error;
mod field;
pub mod header;
pub mod layout;
mod packet;
mod stream;

pub use decode::{decode_fields, Fields, Value};
pub use error::{Error, Result};
pub use field::{ByteOrder, Field, Kind};
pub use packet::{packet_len, PacketDef, PACKET_LEN_OVERHEAD};
pub use stream::{ApidTable, DecodedPacket, StreamParser, StreamParserBuilder};

/// Application Process Identifier; selects the definition used to decode a packet.
pub type Apid = u16;

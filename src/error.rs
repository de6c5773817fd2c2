use crate::Apid;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A field or packet definition is invalid.
    #[error("invalid definition: {0}")]
    Config(String),

    /// Fields cannot be placed in a packet of the requested length.
    #[error("invalid layout: {0}")]
    Layout(String),

    /// A header decoded to an APID that has no packet definition.
    #[error("unknown APID {0}")]
    UnknownApid(Apid),

    #[error("Not enough bytes")]
    NotEnoughData {
        /// Number of bytes we got
        actual: usize,
        /// Minimum number of expected bytes
        minimum: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

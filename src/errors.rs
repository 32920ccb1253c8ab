use std::{fmt, io, num::{ParseFloatError, ParseIntError}, str::Utf8Error};
use quick_xml::events::attributes::AttrError;

use crate::data::osm::OsmId;

/// What went wrong. The first three are fatal for the relation being converted and
/// carry the offending id so a malformed dataset can be diagnosed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownWayReference(OsmId),
    UnknownNodeReference(OsmId),
    NoNodesAvailable,
    Config,
    Other,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn unknown_way(id: OsmId) -> Self {
        Error {
            kind: ErrorKind::UnknownWayReference(id),
            message: format!("Way {} is referenced but not present in the data", id),
        }
    }

    pub fn unknown_node(id: OsmId) -> Self {
        Error {
            kind: ErrorKind::UnknownNodeReference(id),
            message: format!("Node {} is referenced but not present in the data", id),
        }
    }

    pub fn no_nodes() -> Self {
        Error {
            kind: ErrorKind::NoNodesAvailable,
            message: "No nodes given, but we need nodes".to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Config,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Config,
            message: value.to_string()
        }
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(value: ureq::Error) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value.to_string()
        }
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error {
            kind: ErrorKind::Other,
            message: value
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

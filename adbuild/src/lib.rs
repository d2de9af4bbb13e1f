//! Builds device files from fabric report streams: a pull parser, an
//! incremental builder with global finishing passes, and the wire-table
//! scan that produces a family's wire list.

pub mod build;
pub mod parse;
pub mod scan;

use std::io::BufRead;

use prjfabric_device::family::FamilyRules;
use prjfabric_device::{Device, WireList};

pub use crate::build::{BuildError, DeviceBuilder};
pub use crate::parse::{ParseError, Parser};

#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Build(BuildError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{e}"),
            Error::Build(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Error::Build(e)
    }
}

/// Parses one fabric report stream into a finished `Device`.
pub fn read_device<R: BufRead>(
    input: R,
    wires: &WireList,
    rules: &FamilyRules,
) -> Result<Device, Error> {
    let mut parser = Parser::new(input)?;
    if parser.family() != wires.family {
        return Err(Error::Build(BuildError::FamilyMismatch {
            stream: parser.family().to_string(),
            wire_list: wires.family.clone(),
        }));
    }
    let mut builder = DeviceBuilder::new(
        parser.part(),
        parser.family(),
        parser.rows(),
        parser.cols(),
        wires,
        rules,
    );
    while let Some(tile) = parser.next_tile()? {
        builder.add_tile(tile)?;
    }
    Ok(builder.finish()?)
}

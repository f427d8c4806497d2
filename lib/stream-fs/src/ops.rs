//! Shorthand operations over a [`StreamFs`], mirroring what callers
//! usually script against a native file API.

use crate::{MetadataOp, Result, StreamFs};
use std::io::{Read, Write};

/// Replaces the object at `uri` with `data`.
pub fn write(fs: &StreamFs, uri: &str, data: &[u8]) -> Result<()> {
    let mut handle = fs.new_open_options().write(true).truncate(true).open(uri)?;
    handle.write_all(data)?;

    handle.close()
}

/// Appends `data` to the object at `uri`, creating it if needed.
pub fn append(fs: &StreamFs, uri: &str, data: &[u8]) -> Result<()> {
    let mut handle = fs.new_open_options().write(true).append(true).open(uri)?;
    handle.write_all(data)?;

    handle.close()
}

/// Reads the full content of the object at `uri`.
pub fn read(fs: &StreamFs, uri: &str) -> Result<Vec<u8>> {
    let mut handle = fs.new_open_options().read(true).open(uri)?;
    let mut data = Vec::new();
    handle.read_to_end(&mut data)?;

    Ok(data)
}

/// Reads the object at `uri` as UTF-8.
pub fn read_to_string(fs: &StreamFs, uri: &str) -> Result<String> {
    let mut handle = fs.new_open_options().read(true).open(uri)?;
    let mut data = String::new();
    handle.read_to_string(&mut data)?;

    Ok(data)
}

/// Creates the object at `uri` empty if it does not exist.
pub fn touch(fs: &StreamFs, uri: &str) -> Result<()> {
    fs.set_metadata(uri, MetadataOp::Touch)
}

//! Shared utilities for the Mosaic compiler.
mod errors;
mod id;
mod out_file;

pub use errors::{Error, MosaicResult};
pub use id::{GetName, Id};
pub use out_file::OutputFile;

//! Command line interface and driver for the Mosaic module generator.
pub mod cmdline;
pub mod driver;

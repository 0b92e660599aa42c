use argh::FromArgs;
use log::LevelFilter;
use mosaic_utils::{Error, MosaicResult, OutputFile};
use std::path::PathBuf;

/// Definition of the command line interface.
#[derive(FromArgs)]
/// The Mosaic hardware-module generator
pub struct Opts {
    /// input design description (JSON)
    #[argh(positional)]
    pub file: PathBuf,

    /// output file, default is stdout
    #[argh(
        option,
        short = 'o',
        long = "output",
        default = "OutputFile::Stdout"
    )]
    pub output: OutputFile,

    /// set the log level (off | error | warn | info | debug | trace)
    #[argh(option, long = "log", default = "LevelFilter::Warn")]
    pub log_level: LevelFilter,
}

impl Opts {
    /// Parse the command line arguments and validate them.
    pub fn get_opts() -> MosaicResult<Opts> {
        let opts: Opts = argh::from_env();
        if !opts.file.exists() {
            return Err(Error::invalid_input(format!(
                "`{}' does not exist",
                opts.file.display()
            )));
        }
        Ok(opts)
    }
}

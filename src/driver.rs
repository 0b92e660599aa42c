//! Driver for the Mosaic module generator.
use crate::cmdline::Opts;
use mosaic_ir::{DesignDesc, Printer};
use mosaic_utils::{Error, MosaicResult};

/// Run the generator from the command line.
pub fn run_generator() -> MosaicResult<()> {
    // parse the command line arguments into Opts struct
    let opts = Opts::get_opts()?;

    // enable tracing
    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    let text = std::fs::read_to_string(&opts.file)?;
    let desc: DesignDesc = serde_json::from_str(&text).map_err(|e| {
        Error::invalid_input(format!("`{}': {e}", opts.file.display()))
    })?;
    let design = desc.build()?;

    let top = mosaic_gen::generate_hw_modules(&design)?;
    log::info!("generated {} hardware modules", top.modules.len());

    let out = &mut opts.output.get_write()?;
    Printer::write_top(&top, out)?;
    Ok(())
}

fn main() {
    match mosaic::driver::run_generator() {
        Ok(()) => (),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

fn main() {
    let args = std::env::args();
    // Initialize logging as early as possible; fallback to stderr on failure.
    let _ = flupload::logging::init_logging(flupload::logging::LogFormat::from_env());

    if let Err(err) = flupload::run(args) {
        eprintln!("flupload error: {err}");
        std::process::exit(1);
    }
}

pub mod device_info;
pub mod upload_access;

/// Initializes logging for the client binaries. `RUST_LOG` takes
/// precedence; otherwise the level is info, or debug with `--debug`.
pub fn init_logging(debug: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else if debug {
        builder.filter_level(log::LevelFilter::Debug);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.init();
}

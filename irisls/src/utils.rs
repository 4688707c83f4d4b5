use log::LevelFilter;

/// Sets up `env_logger`: warnings by default, everything with `--debug`. `RUST_LOG` still
/// overrides either.
pub fn initialize_logging_from_args(matches: &clap::ArgMatches) {
    let level = if matches.is_present("debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env();
    // a second initialization (tests) is harmless
    let _ = builder.try_init();
}

extern crate irisls;

fn main() {
    let matches = irisls::cli::parse_flags();

    irisls::utils::initialize_logging_from_args(&matches);

    let code = match irisls::run::run(&matches) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", err);
            irisls::run::EXIT_NOT_FOUND
        }
    };
    std::process::exit(code);
}

use std::process::ExitCode;

use changeset_pr::cli::{self, Cli};

fn main() -> ExitCode {
    let args = Cli::parse_args();
    cli::init_tracing(args.debug, args.log_json, args.quiet);

    match cli::run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

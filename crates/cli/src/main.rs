use std::process::ExitCode;

fn main() -> ExitCode {
    promissory_cli::run()
}

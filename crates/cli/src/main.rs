use std::process::ExitCode;

fn main() -> ExitCode {
    woms_cli::run()
}

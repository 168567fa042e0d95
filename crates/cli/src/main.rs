use std::process::ExitCode;

fn main() -> ExitCode {
    artibot_cli::run()
}

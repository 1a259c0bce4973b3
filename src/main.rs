use std::process::ExitCode;

fn main() -> ExitCode {
    altair80_lib::run()
}

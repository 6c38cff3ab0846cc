use std::process::ExitCode;

use race_kernel::driver::{init_logging, parse_args, run, ExitCode as DriverExitCode};

fn main() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();

    let args = match parse_args(&raw_args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("race-driver: {e}");
            return ExitCode::from(DriverExitCode::Configuration as u8);
        }
    };

    init_logging(&args.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("race-driver: failed to start runtime: {e}");
            return ExitCode::from(DriverExitCode::RuntimeFatal as u8);
        }
    };

    let code = runtime.block_on(run(args));
    ExitCode::from(code as u8)
}

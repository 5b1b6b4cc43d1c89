use std::process::ExitCode;

use pantier::PantierError;

fn main() -> ExitCode {
    match pantier::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            if let PantierError::LossyConversion { report } = &err {
                eprint!("{report}");
                eprintln!();
                eprintln!("Re-run with --allow-lossy to write anyway.");
            }
            ExitCode::FAILURE
        }
    }
}

use std::process::ExitCode;

use coalition_engine::EngineError;

mod command;
mod provider;
mod sink;
mod store;
mod util;

fn main() -> ExitCode {
    match command::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Maps the engine error behind `err`, if any, to a distinct process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(engine_err) = err.chain().find_map(|e| e.downcast_ref::<EngineError>()) else {
        return 1;
    };
    match engine_err {
        EngineError::InvalidFeatureData { .. } => 10,
        EngineError::DegenerateResult { .. } => 11,
        EngineError::Timeout { .. } | EngineError::Cancelled { .. } => 12,
        EngineError::ConvergenceTimeout { .. } => 13,
        EngineError::WorkerExecution { .. } => 14,
        EngineError::InvalidConfig { .. } => 15,
    }
}

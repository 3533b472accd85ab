//! Failure diagnostics from simulated program logs.

use crate::ledger::SimulationResult;

const PROGRAM_LOG_PREFIX: &str = "Program log: ";

/// The last line a program logged, without its prefix.
pub fn last_program_log(logs: &[String]) -> Option<&str> {
    logs.iter()
        .rev()
        .find_map(|line| line.strip_prefix(PROGRAM_LOG_PREFIX))
}

/// Pick the most readable explanation for a failed transaction.
///
/// Preference order: the last program log line of a failing simulation, the
/// simulation's raw error, then the error reported at confirmation.
pub fn failure_message(simulation: &SimulationResult, confirmation_error: &str) -> String {
    let Some(err) = &simulation.err else {
        return confirmation_error.to_string();
    };

    match simulation.logs.as_deref().and_then(last_program_log) {
        Some(line) => format!("Transaction failed: {}", line),
        None => err.to_string(),
    }
}

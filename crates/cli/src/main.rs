//! Cairn CLI.
//!
//! - `cairn run <input.jsonl>`: process records through the configured pipeline
//! - `cairn verify`: check the persisted chain, WAL and dedup journal
//! - `cairn replay [--export f]`: recompute the cumulative hash from the WAL
//! - `cairn recover [--resolve]`: report (or roll back) indeterminate publishes
//! - `cairn keygen --scheme s --out f`: create a signing key file
//!
//! Exit codes: 0 ok, 1 error, 2 verification failed, 3 indeterminate
//! transactions found.

mod commands;
mod exec;
mod logging;
mod parse;

use std::process;

use commands::build_cli;
use parse::{globals, matches_to_action};

fn main() {
    let matches = build_cli().get_matches();
    let globals = globals(&matches);
    logging::init(&globals.log_level);

    let result = matches_to_action(&matches)
        .and_then(|action| exec::execute(action, &globals.config, globals.output));

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

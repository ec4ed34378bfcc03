//! clap command tree

use clap::{Arg, ArgAction, Command};

/// Build the `cairn` command
pub fn build_cli() -> Command {
    Command::new("cairn")
        .about("Auditable evaluation-record pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .default_value("cairn.toml")
                .help("Pipeline config file (TOML)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log level (error, warn, info, debug, trace); RUST_LOG wins"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print machine-readable JSON"),
        )
        .subcommand(
            Command::new("run")
                .about("Process a JSONL file of evaluation records, one payload per line")
                .arg(Arg::new("input").required(true).help("Input file, or - for stdin"))
                .arg(
                    Arg::new("upstream")
                        .long("upstream")
                        .help("Upstream provenance URI (default: file://<input>)"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify the persisted checkpoint chain, WAL and dedup journal")
                .arg(
                    Arg::new("public-key")
                        .long("public-key")
                        .help("Ed25519 public key hex; verify without the private key"),
                ),
        )
        .subcommand(
            Command::new("replay")
                .about("Recompute the cumulative hash from the WAL and compare with the chain")
                .arg(
                    Arg::new("public-key")
                        .long("public-key")
                        .help("Ed25519 public key hex; verify without the private key"),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .help("Write the forensic export (JSON) to this file"),
                ),
        )
        .subcommand(
            Command::new("recover")
                .about("Report indeterminate publish transactions in the WAL")
                .arg(
                    Arg::new("resolve")
                        .long("resolve")
                        .action(ArgAction::SetTrue)
                        .help("Roll back every indeterminate transaction"),
                ),
        )
        .subcommand(
            Command::new("keygen")
                .about("Generate a signing key file")
                .arg(
                    Arg::new("scheme")
                        .long("scheme")
                        .required(true)
                        .value_parser(["ed25519", "shared-secret"])
                        .help("Signature scheme"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .required(true)
                        .help("Key file to create"),
                ),
        )
}

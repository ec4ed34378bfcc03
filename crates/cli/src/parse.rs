//! ArgMatches → CliAction conversion.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use cairn_security::SignatureScheme;
use clap::ArgMatches;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// A parsed invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run {
        input: String,
        upstream: Option<String>,
    },
    Verify {
        public_key: Option<String>,
    },
    Replay {
        public_key: Option<String>,
        export: Option<PathBuf>,
    },
    Recover {
        resolve: bool,
    },
    Keygen {
        scheme: SignatureScheme,
        out: PathBuf,
    },
}

/// Global options shared by every subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Globals {
    pub config: PathBuf,
    pub log_level: String,
    pub output: OutputMode,
}

pub fn globals(matches: &ArgMatches) -> Globals {
    Globals {
        config: matches
            .get_one::<String>("config")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("cairn.toml")),
        log_level: matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| "info".to_string()),
        output: if matches.get_flag("json") {
            OutputMode::Json
        } else {
            OutputMode::Human
        },
    }
}

/// Convert clap ArgMatches into a CliAction.
pub fn matches_to_action(matches: &ArgMatches) -> Result<CliAction> {
    let (sub_name, m) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("No command provided"))?;

    match sub_name {
        "run" => Ok(CliAction::Run {
            input: m
                .get_one::<String>("input")
                .cloned()
                .ok_or_else(|| anyhow!("run requires an input file"))?,
            upstream: m.get_one::<String>("upstream").cloned(),
        }),
        "verify" => Ok(CliAction::Verify {
            public_key: m.get_one::<String>("public-key").cloned(),
        }),
        "replay" => Ok(CliAction::Replay {
            public_key: m.get_one::<String>("public-key").cloned(),
            export: m.get_one::<String>("export").map(PathBuf::from),
        }),
        "recover" => Ok(CliAction::Recover {
            resolve: m.get_flag("resolve"),
        }),
        "keygen" => {
            let name = m
                .get_one::<String>("scheme")
                .ok_or_else(|| anyhow!("keygen requires --scheme"))?;
            let scheme =
                SignatureScheme::parse(name).ok_or_else(|| anyhow!("Unknown scheme: {name}"))?;
            let out = m
                .get_one::<String>("out")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("keygen requires --out"))?;
            Ok(CliAction::Keygen { scheme, out })
        }
        other => Err(anyhow!("Unknown command: {other}")),
    }
}

//! stratum CLI
//!
//! Loads a seed of versioned policies and answers evaluation, masking and
//! history queries against it.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commands;
mod config;
mod seed;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use commands::{FamilyKind, MaskRequest};
use config::StratumConfig;
use seed::Seed;
use std::path::PathBuf;
use stratum_core::{Clock, SystemClock, Timestamp};
use stratum_enforce::{MaskRule, SensitiveField};
use stratum_engine::PolicyQuery;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(about = "stratum - versioned data-governance policies", long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a query against one policy family
    Evaluate {
        /// Seed file
        #[arg(short, long)]
        seed: PathBuf,
        /// Policy family
        #[arg(long, value_enum, default_value = "masking")]
        family: FamilyKind,
        /// Feature code
        #[arg(long)]
        feature: String,
        /// Action code
        #[arg(long)]
        action: Option<String>,
        /// Permission group
        #[arg(long)]
        permission_group: Option<String>,
        /// Organization group, repeatable
        #[arg(long = "org-group")]
        org_groups: Vec<String>,
        /// Data classification
        #[arg(long)]
        classification: Option<String>,
        /// Evaluation time, RFC 3339, defaults to now
        #[arg(long, value_parser = commands::parse_timestamp)]
        at: Option<Timestamp>,
    },
    /// Mask one value for a caller
    Mask {
        /// Seed file
        #[arg(short, long)]
        seed: PathBuf,
        /// Caller username
        #[arg(short, long)]
        user: String,
        /// Feature code
        #[arg(long)]
        feature: String,
        /// Action code
        #[arg(long)]
        action: Option<String>,
        /// Permission group
        #[arg(long)]
        permission_group: Option<String>,
        /// Organization group, repeatable
        #[arg(long = "org-group")]
        org_groups: Vec<String>,
        /// Field name
        #[arg(long)]
        field: String,
        /// Field classification
        #[arg(long)]
        classification: Option<String>,
        /// Rule applied when masked
        #[arg(long, value_parser = commands::parse_rule, default_value = "FULL")]
        rule: MaskRule,
        /// Raw value, parsed as JSON when possible
        #[arg(long)]
        value: String,
        /// Request time, RFC 3339, defaults to now
        #[arg(long, value_parser = commands::parse_timestamp)]
        at: Option<Timestamp>,
    },
    /// Show a policy's version history
    History {
        /// Seed file
        #[arg(short, long)]
        seed: PathBuf,
        /// Policy family
        #[arg(long, value_enum, default_value = "masking")]
        family: FamilyKind,
        /// Policy code
        #[arg(long)]
        code: String,
    },
    /// Show the version that was on record at a point in time
    AsOf {
        /// Seed file
        #[arg(short, long)]
        seed: PathBuf,
        /// Policy family
        #[arg(long, value_enum, default_value = "masking")]
        family: FamilyKind,
        /// Policy code
        #[arg(long)]
        code: String,
        /// Point in time, RFC 3339
        #[arg(long, value_parser = commands::parse_timestamp)]
        at: Timestamp,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = StratumConfig::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let out = run(cli.command, &config, &SystemClock)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Execute one subcommand, taking default times from `clock`
fn run(command: Commands, config: &StratumConfig, clock: &dyn Clock) -> Result<serde_json::Value> {
    let out = match command {
        Commands::Evaluate {
            seed,
            family,
            feature,
            action,
            permission_group,
            org_groups,
            classification,
            at,
        } => {
            let catalog = Seed::load(&seed)?.into_catalog(config)?;
            let query = PolicyQuery {
                feature_code: feature,
                action_code: action,
                permission_group_code: permission_group,
                organization_group_codes: org_groups,
                classification,
                timestamp: at.unwrap_or_else(|| clock.now()),
            };
            commands::evaluate(&catalog, family, &query)?
        }
        Commands::Mask {
            seed,
            user,
            feature,
            action,
            permission_group,
            org_groups,
            field,
            classification,
            rule,
            value,
            at,
        } => {
            let catalog = Seed::load(&seed)?.into_catalog(config)?;
            let mut field = SensitiveField::new(field, rule);
            field.classification = classification;
            let request = MaskRequest {
                caller: commands::caller(
                    &user,
                    &feature,
                    action.as_deref(),
                    permission_group.as_deref(),
                    &org_groups,
                ),
                field,
                value: serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value)),
                at: at.unwrap_or_else(|| clock.now()),
            };
            commands::mask(&catalog, &config.masking, &request)?
        }
        Commands::History { seed, family, code } => {
            let catalog = Seed::load(&seed)?.into_catalog(config)?;
            commands::history(&catalog, family, &code)?
        }
        Commands::AsOf {
            seed,
            family,
            code,
            at,
        } => {
            let catalog = Seed::load(&seed)?.into_catalog(config)?;
            commands::as_of(&catalog, family, &code, at)?
        }
    };
    Ok(out)
}

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "artibot",
    about = "Artibot operator CLI",
    long_about = "Operate Artibot database migrations, demo fixtures, configuration inspection, \
                  readiness checks, and the reminder sweep.",
    after_help = "Examples:\n  artibot doctor --json\n  artibot migrate\n  artibot sweep --tenant tenant-demo-001"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify the seed contract")]
    Seed,
    #[command(about = "Run one reminder/relance evaluation pass for a tenant")]
    Sweep {
        #[arg(long, help = "Tenant whose rdv rappels and overdue documents are evaluated")]
        tenant: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate configuration, database connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Sweep { tenant } => commands::sweep::run(&tenant),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

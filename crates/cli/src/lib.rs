pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "woms",
    about = "Warehouse order management operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness, mint bearer tokens and load demo data.",
    after_help = "Examples:\n  woms doctor --json\n  woms config\n  woms token --actor analyst-1 --name \"Ben Okafor\" --role budget_analyst\n  woms seed"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Issue a signed bearer token for an actor")]
    Token {
        #[arg(long, help = "Stable actor id placed in the `sub` claim")]
        actor: String,
        #[arg(long, help = "Display name shown on documents and notifications")]
        name: String,
        #[arg(long, help = "Role wire name, e.g. warehouse_staff or budget_analyst")]
        role: String,
        #[arg(long, help = "Mark the role as not yet confirmed by an administrator")]
        unconfirmed: bool,
    },
    #[command(about = "Load one demo restock request per workflow stage")]
    Seed,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Token { actor, name, role, unconfirmed } => {
            commands::token::run(commands::token::TokenRequest { actor, name, role, unconfirmed })
        }
        Command::Seed => commands::seed::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

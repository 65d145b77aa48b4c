pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "parceldesk",
    about = "ParcelDesk operator CLI",
    long_about = "Operate the ParcelDesk support router: migrations, seed data, config inspection, readiness checks, and one-off email processing.",
    after_help = "Examples:\n  parceldesk doctor --json\n  parceldesk seed\n  parceldesk process --from john.doe@email.com --subject \"Order status\" --body \"Where is my order?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load customers and orders from JSON documents or the built-in demo dataset")]
    Seed {
        #[arg(long, help = "Directory holding users.json and orders.json")]
        data_dir: Option<PathBuf>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model provider setup, and database schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Route a single email and print the outcome with its trace")]
    Process {
        #[arg(long, help = "Sender address")]
        from: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long)]
        body: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { data_dir } => commands::seed::run(data_dir.as_deref()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Process { from, subject, body } => {
            commands::process::run(&from, &subject, &body)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

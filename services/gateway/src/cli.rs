use crate::commands::{run_applications_list, run_check, ApplicationsListArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use squadron_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Squadron Intake Gateway",
    about = "Run the squadron application intake bot bridge and inspect its application store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP bridge (default command)
    Serve(ServeArgs),
    /// Load and validate every configuration file, then print a summary
    Check,
    /// Inspect the application store
    Applications {
        #[command(subcommand)]
        command: ApplicationsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ApplicationsCommand {
    /// Print stored applications, optionally filtered by status
    List(ApplicationsListArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Check => run_check(),
        Command::Applications {
            command: ApplicationsCommand::List(args),
        } => run_applications_list(args),
    }
}

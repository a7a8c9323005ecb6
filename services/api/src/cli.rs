use crate::demo::{print_statuses, run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use rental_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Rental Desk",
    about = "Run and demonstrate the booking lifecycle service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the booking status table and its legal transitions
    Statuses,
    /// Walk a booking through its lifecycle against an in-memory fleet
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load a small demo fleet into the in-memory store on startup
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Statuses => {
            print_statuses();
            Ok(())
        }
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_and_accepts_overrides() {
        let cli = Cli::try_parse_from(["rental-desk-api"]).expect("parses");
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from([
            "rental-desk-api",
            "serve",
            "--port",
            "8088",
            "--seed-demo",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8088));
                assert!(args.seed_demo);
                assert!(args.host.is_none());
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn demo_accepts_rule_file() {
        let cli = Cli::try_parse_from(["rental-desk-api", "demo", "--rules", "rules.csv"])
            .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(
                    args.rules.as_deref(),
                    Some(std::path::Path::new("rules.csv"))
                );
            }
            other => panic!("expected demo, got {other:?}"),
        }
    }
}

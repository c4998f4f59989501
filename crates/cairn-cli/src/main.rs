mod cli;
mod dispatch;

use clap::Parser;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = dispatch::dispatch(cli.command) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(cli::LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: cli::Cli) -> Result<(), repo_manifest::ManifestError> {
    let req = args.into_request()?;
    let out = repo_manifest::update(&req)?;
    if out.written {
        println!("Updated {} with version {}", out.file.display(), out.version);
    } else {
        print!("{}", out.rendered);
    }
    Ok(())
}

fn main() {
    init_tracing();
    let args = cli::Cli::parse();

    if let Err(e) = run(args) {
        tracing::debug!(code = e.code(), "update failed");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

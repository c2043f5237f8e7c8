use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;

use crd_bumper_core::RunMode;

mod bump;
mod serve;
mod vendor;
mod workarea;

#[derive(Parser)]
#[command(name = "crd-bumper")]
#[command(about = "Bump the CRD API version of a kubebuilder repository", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(flatten)]
    workarea: workarea::WorkareaArgs,

    #[command(flatten)]
    versions: bump::VersionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every remaining step of the bump
    All,

    /// Run only the next step of the bump
    Step,

    /// Move a repository that vendors another module's API to its new hub
    VendorNewApi(vendor::VendorArgs),

    /// Stop serving a spoke API version
    Unserve(serve::ServeArgs),

    /// Serve a spoke API version again
    #[command(name = "re-serve")]
    ReServe(serve::ServeArgs),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e}", "Error:".red());
        for cause in e.chain().skip(1) {
            eprintln!("  {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Default level depends on --debug; RUST_LOG overrides it
    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("info")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::All => bump::execute(RunMode::All, &cli.versions, &cli.workarea),
        Commands::Step => bump::execute(RunMode::Step, &cli.versions, &cli.workarea),
        Commands::VendorNewApi(args) => vendor::execute(args, &cli.workarea),
        Commands::Unserve(args) => serve::execute(serve::Action::Unserve, args, &cli.workarea),
        Commands::ReServe(args) => serve::execute(serve::Action::ReServe, args, &cli.workarea),
    }
}

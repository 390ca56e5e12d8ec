mod commands;
mod guard;
mod terminal;

use commands::{CommandLine, Commands, check, run, scan};
use guard::InstanceLock;
use infrasync_common::config::Config;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    dotenvy::dotenv().ok();
    logging::init(commands.verbose);
    guard::refuse_root()?;

    // A configuration that fails here is fatal; later reloads in `run` are not.
    let cfg = Config::load(&commands.config)?;

    match commands.command {
        Commands::Run => {
            let _lock = InstanceLock::acquire(&cfg.scan.lock_file)?;
            print::header("continuous discovery");
            run::run(&commands.config).await
        }
        Commands::Scan { dry_run } => {
            let _lock = InstanceLock::acquire(&cfg.scan.lock_file)?;
            print::header(if dry_run { "dry run" } else { "discovery cycle" });
            scan::scan(&cfg, dry_run).await
        }
        Commands::Check => {
            print::header("inventory check");
            check::check(&cfg).await
        }
    }
}

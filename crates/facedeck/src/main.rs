mod cli;
mod control;
mod paths;
mod preview;
mod run;
mod simulator;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Preview(args)) => preview::run_preview(args),
        Some(Command::Where) => run_where(),
        None => run::run(cli.run),
    }
}

fn run_where() -> Result<()> {
    let paths = AppPaths::discover()?;
    let config_file = paths.config_file();
    println!("Configuration directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  data:       {}", paths.data_dir().display());
    println!("  frames:     {}", paths.frames_dir().display());
    println!(
        "Config file: {} ({})",
        config_file.display(),
        if config_file.exists() {
            "present"
        } else {
            "missing, using defaults"
        }
    );
    Ok(())
}

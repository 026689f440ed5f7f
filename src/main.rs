mod asm;
mod builtins;
mod cli;
mod driver;
mod gc;
mod symbol;
mod vm;

use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

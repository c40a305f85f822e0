//! Command-line entry point for the contacts store.

mod cli;

fn main() -> anyhow::Result<()> {
    cli::run()
}

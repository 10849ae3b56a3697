mod aggregate;
mod cli;
mod config;
mod data;
mod error;
mod process;
mod state;
mod ui;

fn main() -> anyhow::Result<()> {
    cli::run()
}

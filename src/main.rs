use clap::Parser;
use neutron::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}

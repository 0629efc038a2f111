use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use flatvmm::{RunOutcome, VmConfig};


#[derive(Parser, Debug)]
#[command(name = "flatvmm")]
#[command(about = "Run a flat guest binary on one KVM vCPU")]
struct Args {
    /// Path to the raw guest image, loaded at 0x1000
    guest: PathBuf,
}


/// Exit status: 0 when the guest halts, 1 on any error or cancellation, and 1
/// for a malformed command line. `--help` and `--version` print and exit 0.
/// Failures writing the usage text or the final `KVM_EXIT_HLT` line are
/// ignored; the exit status already carries the outcome.
fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    match run(&args) {
        Ok(RunOutcome::Halted) => {
            let mut out = std::io::stdout();
            let _ = writeln!(out, "KVM_EXIT_HLT");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Cancelled) => {
            eprintln!("flatvmm: stopped before the guest halted");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("flatvmm: {e:#}");
            ExitCode::FAILURE
        }
    }
}


fn run(args: &Args) -> Result<RunOutcome> {
    let config = VmConfig::default();
    info!("Starting {} with config: {:?}", args.guest.display(), config);
    flatvmm::vmm::run::run_vm(&config, &args.guest)
        .with_context(|| format!("guest {}", args.guest.display()))
}

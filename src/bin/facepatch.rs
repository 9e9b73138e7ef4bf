//! facepatch CLI tool
//!
//! Command-line interface for previewing masked face compositing.

#[cfg(feature = "cli")]
use facepatch::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}

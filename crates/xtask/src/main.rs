//! Developer tasks for the typeswitch workspace.
use std::env;

mod bench;
mod process;

use process::run_checked;

fn main() {
    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| "verify".to_string());
    let next = args.next();
    let result = match cmd.as_str() {
        "verify" => verify(),
        "fmt" => fmt_check(),
        "clippy" => clippy(),
        "lint" => lint_strict(),
        "test" => test_workspace(),
        "bench-report" => bench::bench_report(next.as_deref()),
        _ => usage_error(&cmd),
    };
    if let Err(msg) = result {
        eprintln!("{msg}");
        std::process::exit(1);
    }
}

fn usage_error(cmd: &str) -> Result<(), String> {
    Err(format!(
        "Unknown command: {cmd}\nUsage: cargo run -p xtask -- <verify|fmt|clippy|lint|test|bench-report [scales]>"
    ))
}

fn verify() -> Result<(), String> {
    fmt_check()?;
    clippy()?;
    test_workspace()?;
    Ok(())
}

fn fmt_check() -> Result<(), String> {
    run_checked("cargo", &["fmt", "--all", "--", "--check"]).map(|_| ())
}

fn clippy() -> Result<(), String> {
    run_checked(
        "cargo",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ],
    )
    .map(|_| ())
}

fn lint_strict() -> Result<(), String> {
    run_checked(
        "cargo",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
            "-W",
            "clippy::all",
            "-W",
            "clippy::perf",
            "-W",
            "clippy::nursery",
        ],
    )
    .map(|_| ())
}

fn test_workspace() -> Result<(), String> {
    run_checked("cargo", &["test", "--workspace"]).map(|_| ())
}

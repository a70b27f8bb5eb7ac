use std::process::{Command, Output};

pub fn run_args(cmd: &str, args: &[&str]) -> Result<Output, String> {
    run_with_env(cmd, args, &[])
}

/// Runs `cmd` with extra environment variables and captures its output.
pub fn run_with_env(cmd: &str, args: &[&str], envs: &[(&str, String)]) -> Result<Output, String> {
    let prefix: String = envs
        .iter()
        .map(|(k, v)| format!("{k}={} ", shell_escape(v)))
        .collect();
    eprintln!(
        "$ {prefix}{} {}",
        cmd,
        args.iter()
            .map(|s| shell_escape(s))
            .collect::<Vec<_>>()
            .join(" ")
    );
    Command::new(cmd)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
        .output()
        .map_err(|e| format!("Failed to run {cmd}: {e}"))
}

/// Like `run_args`, but a non-zero exit status is an error.
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<Output, String> {
    let o = run_args(cmd, args)?;
    if o.status.success() {
        return Ok(o);
    }
    Err(format!(
        "{cmd} {} failed:\n{}",
        args.join(" "),
        format_output(&o)
    ))
}

pub fn format_output(o: &Output) -> String {
    let mut s = String::new();
    if !o.stdout.is_empty() {
        s.push_str("stdout:\n");
        s.push_str(&String::from_utf8_lossy(&o.stdout));
        if !s.ends_with('\n') {
            s.push('\n');
        }
    }
    if !o.stderr.is_empty() {
        s.push_str("stderr:\n");
        s.push_str(&String::from_utf8_lossy(&o.stderr));
        if !s.ends_with('\n') {
            s.push('\n');
        }
    }
    if s.is_empty() {
        s.push_str("(no output)\n");
    }
    s
}

fn shell_escape(s: &str) -> String {
    if s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c)) {
        return s.to_string();
    }
    format!("{:?}", s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_escape_quotes_only_when_needed() {
        assert_eq!(shell_escape("--release"), "--release");
        assert_eq!(shell_escape("a b"), "\"a b\"");
    }
}

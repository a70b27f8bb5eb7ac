use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::process::{format_output, run_args, run_with_env};

const DEFAULT_SCALES: [usize; 2] = [10_000, 50_000];
const STRATEGIES: [&str; 3] = ["open", "closed", "uncached"];
const CASE_ORDER: [&str; 2] = ["mixed", "monomorphic"];

#[derive(Clone, Debug, Deserialize)]
struct PerfJsonLine {
    #[serde(rename = "case")]
    case_name: String,
    strategy: String,
    scale: usize,
    duration_ms: f64,
}

/// case -> strategy -> milliseconds
type ScaleTable = BTreeMap<String, BTreeMap<String, f64>>;

pub fn bench_report(scales_arg: Option<&str>) -> Result<(), String> {
    let scales = parse_scales(scales_arg)?;
    let rustc = run_args("rustc", &["-V"])
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    let mut all: BTreeMap<usize, ScaleTable> = BTreeMap::new();
    for &scale in &scales {
        let out = run_with_env(
            "cargo",
            &[
                "test",
                "-p",
                "ts_dispatch",
                "--release",
                "--test",
                "perf_dispatch",
                "--",
                "--ignored",
                "--nocapture",
                "--test-threads=1",
            ],
            &[("TS_BENCH_SCALE", scale.to_string())],
        )?;
        if !out.status.success() {
            return Err(format!(
                "perf_dispatch at scale {scale} failed:\n{}",
                format_output(&out)
            ));
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        all.insert(scale, parse_perf_output(scale, &stdout)?);
    }

    let report_path = PathBuf::from("benchmarks").join("report.md");
    let mut md = String::new();
    md.push_str("# Dispatch Benchmarks\n\n");
    md.push_str(&format!(
        "- Generated: {}\n",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    ));
    md.push_str(&format!(
        "- Scales: {}\n",
        scales
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    md.push_str(&format!(
        "- OS: {} / {}\n",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    if let Some(s) = rustc.filter(|s| !s.is_empty()) {
        md.push_str(&format!("- Rust: {s}\n"));
    }
    md.push('\n');

    for (&scale, table) in &all {
        md.push_str(&render_scale(scale, table));
    }

    if let Some(dir) = report_path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    }
    fs::write(&report_path, md)
        .map_err(|e| format!("Failed to write {}: {e}", report_path.display()))?;
    eprintln!("Wrote {}", report_path.display());
    Ok(())
}

fn render_scale(scale: usize, table: &ScaleTable) -> String {
    let mut md = format!("## Scale {scale}\n\n");
    md.push_str("| case | open (ms) | closed (ms) | uncached (ms) | winner | open vs uncached |\n");
    md.push_str("|---|---:|---:|---:|---|---:|\n");

    let mut rows: Vec<&str> = CASE_ORDER
        .iter()
        .copied()
        .filter(|c| table.contains_key(*c))
        .collect();
    for c in table.keys() {
        if !rows.contains(&c.as_str()) {
            rows.push(c);
        }
    }

    for case_name in rows {
        let ms = |strategy: &str| table.get(case_name).and_then(|m| m.get(strategy)).copied();
        let winner = STRATEGIES
            .iter()
            .filter_map(|&s| ms(s).map(|v| (s, v)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, _)| s)
            .unwrap_or("-");
        let speedup = match (ms("open"), ms("uncached")) {
            (Some(open), Some(uncached)) if open > 0.0 => format!("{:.2}x", uncached / open),
            _ => "-".to_string(),
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            case_name,
            fmt_ms(ms("open")),
            fmt_ms(ms("closed")),
            fmt_ms(ms("uncached")),
            winner,
            speedup
        ));
    }
    md.push('\n');
    md
}

fn parse_scales(scales_arg: Option<&str>) -> Result<Vec<usize>, String> {
    let Some(s) = scales_arg else {
        return Ok(DEFAULT_SCALES.to_vec());
    };
    let mut out = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let v: usize = part
            .parse()
            .map_err(|_| format!("bench-report scales must be like 10000,50000; got {s}"))?;
        out.push(v);
    }
    if out.is_empty() {
        Ok(DEFAULT_SCALES.to_vec())
    } else {
        Ok(out)
    }
}

fn fmt_ms(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => {
            if x == 0.0 {
                return "<1".into();
            }
            format!("{:.2}", x)
        }
        _ => "-".into(),
    }
}

/// Collects the JSON lines printed by the perf test; other output is skipped.
fn parse_perf_output(scale: usize, stdout: &str) -> Result<ScaleTable, String> {
    let mut table = ScaleTable::new();
    for raw in stdout.lines() {
        let line = raw.trim();
        if !line.starts_with('{') {
            continue;
        }
        let v: PerfJsonLine = serde_json::from_str(line)
            .map_err(|e| format!("Bad JSON in perf output: {e}: {line}"))?;
        if v.scale != scale {
            continue;
        }
        table
            .entry(v.case_name)
            .or_default()
            .insert(v.strategy, v.duration_ms);
    }
    if table.is_empty() {
        return Err(format!("perf_dispatch printed no results at scale {scale}"));
    }
    Ok(table)
}

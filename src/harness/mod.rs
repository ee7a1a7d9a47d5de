//! Acceptance harness: ordered shell invocations checked against expected
//! files or baseline rasters.

pub mod scenario;
pub mod tutorial;

use std::path::Path;
use std::process::Command;

use crate::data::Raster;

pub use scenario::{Check, ComparePair, RunReport, Scenario, Step, StepOutcome};
pub use tutorial::tutorial;

/// Tolerance for classification maps produced by inference.
pub const INFERENCE_MAE_TOL: f64 = 10.0;
/// Tolerance for extracted patches and labels.
pub const PATCHES_MAE_TOL: f64 = 0.01;

/// Variables substituted by default.
pub const DEFAULT_VARS: [&str; 2] = ["TMPDIR", "DATADIR"];

/// Replace `$NAME` with the environment value of `NAME` for each name in `vars`.
///
/// Other variables, and listed ones that are unset, are left untouched.
pub fn resolve_paths(text: &str, vars: &[&str]) -> String {
    resolve_with(text, vars, |name| std::env::var(name).ok())
}

fn resolve_with(text: &str, vars: &[&str], lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..len];
        match vars.contains(&name).then(|| lookup(name)).flatten() {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

/// Run `command` through `sh -c` after substitution. Returns the exit code,
/// `None` if the shell could not be started or was killed by a signal.
pub fn run_command(command: &str, vars: &[&str]) -> Option<i32> {
    let full_command = resolve_paths(command, vars);
    log::info!("Running command:\n\t{}", full_command);
    match Command::new("sh").arg("-c").arg(&full_command).status() {
        Ok(status) => {
            log::info!("Command exited with {}", status);
            status.code()
        }
        Err(e) => {
            log::warn!("Could not start command: {}", e);
            None
        }
    }
}

/// Every file in `files` exists after substitution.
pub fn files_exist(files: &[String], vars: &[&str]) -> bool {
    log::info!("Checking if files exist...");
    for file in files {
        let path = resolve_paths(file, vars);
        if !Path::new(&path).is_file() {
            log::warn!("File {} does not exist!", path);
            return false;
        }
        log::info!("\t{} ok", path);
    }
    true
}

pub fn run_command_and_test_exist(command: &str, files: &[String], vars: &[&str]) -> bool {
    run_command(command, vars);
    files_exist(files, vars)
}

/// `false` when either raster is unreadable or their sizes or band counts
/// differ, otherwise whether the mean absolute error is within `tol`.
pub fn compare_rasters(baseline: &Path, output: &Path, tol: f64) -> bool {
    let (base, out) = match (Raster::read(baseline), Raster::read(output)) {
        (Ok(base), Ok(out)) => (base, out),
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("Cannot compare {} and {}: {:#}", baseline.display(), output.display(), e);
            return false;
        }
    };
    match base.mean_absolute_error(&out) {
        Some(mae) => {
            log::info!("MAE between {} and {}: {:.6}", baseline.display(), output.display(), mae);
            mae <= tol
        }
        None => {
            log::warn!(
                "Shape mismatch: {}x{}x{} vs {}x{}x{}",
                base.width,
                base.height,
                base.bands,
                out.width,
                out.height,
                out.bands
            );
            false
        }
    }
}

pub fn compare_pairs(pairs: &[ComparePair], tol: f64, vars: &[&str]) -> bool {
    for pair in pairs {
        let baseline = resolve_paths(&pair.baseline, vars);
        let output = resolve_paths(&pair.output, vars);
        if !compare_rasters(Path::new(&baseline), Path::new(&output), tol) {
            log::warn!("Baseline {} and output {} differ.", baseline, output);
            return false;
        }
    }
    true
}

pub fn run_command_and_compare(command: &str, pairs: &[ComparePair], tol: f64, vars: &[&str]) -> bool {
    run_command(command, vars);
    compare_pairs(pairs, tol, vars)
}

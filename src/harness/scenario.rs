use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{compare_pairs, files_exist, run_command, DEFAULT_VARS, PATCHES_MAE_TOL};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparePair {
    pub baseline: String,
    pub output: String,
}

impl ComparePair {
    pub fn new(baseline: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
            output: output.into(),
        }
    }
}

fn default_tolerance() -> f64 {
    PATCHES_MAE_TOL
}

/// What makes a step pass once its command has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Check {
    /// Run only; the outcome does not depend on the command.
    None,
    Exist {
        files: Vec<String>,
    },
    Compare {
        pairs: Vec<ComparePair>,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub order: u32,
    pub name: String,
    pub command: String,
    pub check: Check,
}

impl Step {
    pub fn exist(order: u32, name: &str, command: impl Into<String>, files: &[impl AsRef<str>]) -> Self {
        Self {
            order,
            name: name.to_string(),
            command: command.into(),
            check: Check::Exist {
                files: files.iter().map(|f| f.as_ref().to_string()).collect(),
            },
        }
    }

    pub fn compare(
        order: u32,
        name: &str,
        command: impl Into<String>,
        pairs: &[(impl AsRef<str>, impl AsRef<str>)],
        tolerance: f64,
    ) -> Self {
        Self {
            order,
            name: name.to_string(),
            command: command.into(),
            check: Check::Compare {
                pairs: pairs
                    .iter()
                    .map(|(b, o)| ComparePair::new(b.as_ref(), o.as_ref()))
                    .collect(),
                tolerance,
            },
        }
    }

    pub fn run_only(order: u32, name: &str, command: impl Into<String>) -> Self {
        Self {
            order,
            name: name.to_string(),
            command: command.into(),
            check: Check::None,
        }
    }

    pub fn run(&self, vars: &[&str]) -> StepOutcome {
        log::info!("[{}] {}", self.order, self.name);
        let exit_code = run_command(&self.command, vars);
        let passed = match &self.check {
            Check::None => true,
            Check::Exist { files } => files_exist(files, vars),
            Check::Compare { pairs, tolerance } => compare_pairs(pairs, *tolerance, vars),
        };
        StepOutcome {
            order: self.order,
            name: self.name.clone(),
            exit_code,
            passed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Variables substituted in commands and paths.
    #[serde(default = "default_vars")]
    pub vars: Vec<String>,
    pub steps: Vec<Step>,
}

fn default_vars() -> Vec<String> {
    DEFAULT_VARS.iter().map(|v| v.to_string()).collect()
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            vars: default_vars(),
            steps,
        }
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Steps sorted by `order`, keeping declaration order within an order.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Run every step whose name contains `only` (all steps when `None`).
    pub fn run(&self, only: Option<&str>) -> RunReport {
        let vars: Vec<&str> = self.vars.iter().map(String::as_str).collect();
        let outcomes = self
            .ordered_steps()
            .into_iter()
            .filter(|s| only.map_or(true, |f| s.name.contains(f)))
            .map(|s| {
                let outcome = s.run(&vars);
                if !outcome.passed {
                    log::warn!("Step '{}' failed", outcome.name);
                }
                outcome
            })
            .collect();
        RunReport {
            scenario: self.name.clone(),
            outcomes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub order: u32,
    pub name: String,
    pub exit_code: Option<i32>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub outcomes: Vec<StepOutcome>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.outcomes.iter().filter(|o| !o.passed).collect()
    }

    /// One line per step, then a total.
    pub fn table(&self) -> String {
        let mut lines = Vec::with_capacity(self.outcomes.len() + 1);
        for o in &self.outcomes {
            let code = o.exit_code.map_or("-".to_string(), |c| c.to_string());
            lines.push(format!(
                "{:>3}  {:<32} exit={:<4} {}",
                o.order,
                o.name,
                code,
                if o.passed { "PASS" } else { "FAIL" }
            ));
        }
        lines.push(format!(
            "{}: {}/{} steps passed",
            self.scenario,
            self.outcomes.len() - self.failures().len(),
            self.outcomes.len()
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.txt");
        let log = log.to_string_lossy().into_owned();
        let scenario = Scenario::new(
            "order",
            vec![
                Step::run_only(2, "second", format!("echo 2 >> {log}")),
                Step::run_only(1, "first", format!("echo 1 >> {log}")),
                Step::exist(3, "third", format!("echo 3 >> {log}"), &[log.as_str()]),
            ],
        );
        let report = scenario.run(None);
        assert!(report.passed());
        assert_eq!(std::fs::read_to_string(dir.path().join("log.txt")).unwrap(), "1\n2\n3\n");
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failure_does_not_stop_later_steps() {
        let scenario = Scenario::new(
            "failing",
            vec![
                Step::exist(1, "missing", "true", &["/nonexistent/file"]),
                Step::run_only(2, "after", "exit 1"),
            ],
        );
        let report = scenario.run(None);
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.outcomes[1].exit_code, Some(1));
        assert!(report.table().ends_with("failing: 1/2 steps passed"));
    }

    #[test]
    fn test_only_filter() {
        let scenario = Scenario::new(
            "filter",
            vec![
                Step::run_only(1, "train_model", "true"),
                Step::run_only(2, "serve_model", "true"),
            ],
        );
        let report = scenario.run(Some("serve"));
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].name, "serve_model");
    }

    #[test]
    fn test_yaml_scenario() {
        let yaml = r#"
name: custom
steps:
  - order: 1
    name: extract
    command: "touch $TMPDIR/a.tif"
    check:
      kind: exist
      files: ["$TMPDIR/a.tif"]
  - order: 2
    name: compare
    command: "true"
    check:
      kind: compare
      pairs:
        - baseline: "$DATADIR/a.tif"
          output: "$TMPDIR/a.tif"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.yaml");
        std::fs::write(&path, yaml).unwrap();

        let scenario = Scenario::from_yaml(&path).unwrap();
        assert_eq!(scenario.vars, vec!["TMPDIR", "DATADIR"]);
        assert_eq!(scenario.steps.len(), 2);
        match &scenario.steps[1].check {
            Check::Compare { pairs, tolerance } => {
                assert_eq!(pairs[0].baseline, "$DATADIR/a.tif");
                assert_eq!(*tolerance, PATCHES_MAE_TOL);
            }
            other => panic!("unexpected check {other:?}"),
        }
    }
}

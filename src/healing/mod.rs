//! Self-healing of the project layout
//!
//! The engine walks a list of [`Expectation`]s, and for every unmet one
//! applies exactly one create-if-absent repair. The resulting
//! [`HealingAction`] list is the audit trail; an already-healthy project
//! produces an empty list.

pub mod engine;
pub mod layout;
pub mod report;
pub mod resolver;

pub use engine::HealingEngine;
pub use layout::ExpectedLayout;
pub use report::HealingReport;
pub use resolver::{DependencyResolver, RuntimeResolver};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One invariant the project layout should satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Directory exists (path relative to the layout root)
    Directory { path: PathBuf },
    /// Seed dataset exists; created with `contents` when missing
    SampleDataset { path: PathBuf, contents: String },
    /// Module importable by the scripting runtime; `package` is what to install
    Dependency { module: String, package: String },
    /// Config file exists; created with `contents` when missing
    ConfigFile { path: PathBuf, contents: String },
}

impl Expectation {
    /// Stable label used as the action target
    pub fn target(&self) -> String {
        match self {
            Expectation::Directory { path }
            | Expectation::SampleDataset { path, .. }
            | Expectation::ConfigFile { path, .. } => path.display().to_string(),
            Expectation::Dependency { package, .. } => package.clone(),
        }
    }
}

/// Result of one corrective action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealingOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Audit record of one corrective action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingAction {
    pub target: String,
    pub problem: String,
    pub action: String,
    pub outcome: HealingOutcome,
}

impl HealingAction {
    pub fn succeeded(&self) -> bool {
        self.outcome == HealingOutcome::Succeeded
    }
}

impl fmt::Display for HealingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            HealingOutcome::Succeeded => {
                write!(f, "{}: {} -> {}", self.target, self.problem, self.action)
            }
            HealingOutcome::Failed { reason } => write!(
                f,
                "{}: {} -> {} FAILED ({})",
                self.target, self.problem, self.action, reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expectation_targets() {
        let dir = Expectation::Directory {
            path: PathBuf::from("data/raw"),
        };
        assert_eq!(dir.target(), "data/raw");

        let dep = Expectation::Dependency {
            module: "sklearn".to_string(),
            package: "scikit-learn".to_string(),
        };
        assert_eq!(dep.target(), "scikit-learn");
    }

    #[test]
    fn test_action_display() {
        let action = HealingAction {
            target: "models".to_string(),
            problem: "directory missing".to_string(),
            action: "created directory".to_string(),
            outcome: HealingOutcome::Failed {
                reason: "permission denied".to_string(),
            },
        };
        let text = action.to_string();
        assert!(text.contains("models"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("permission denied"));
        assert!(!action.succeeded());
    }
}

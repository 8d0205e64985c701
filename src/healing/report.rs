//! Healing report
//!
//! Persisted after every pass so an external collaborator (for example
//! the app server's health endpoint) can show what was last repaired.

use super::{HealingAction, HealingOutcome};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub actions: Vec<HealingAction>,
}

impl HealingReport {
    pub fn new(actions: Vec<HealingAction>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            actions,
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &HealingAction> {
        self.actions.iter().filter(|a| !a.succeeded())
    }

    pub fn is_clean(&self) -> bool {
        self.actions.is_empty()
    }

    /// Write as JSON, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read the last persisted report
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Human-readable action list
    pub fn render(&self) -> String {
        if self.actions.is_empty() {
            return format!("{} Project healthy, nothing to heal\n", "✓".green());
        }

        let mut out = format!(
            "Healing actions ({} total, {} failed)\n",
            self.actions.len(),
            self.failed().count()
        );

        for action in &self.actions {
            let line = match &action.outcome {
                HealingOutcome::Succeeded => format!(
                    "  {} {:<24} {} ({})",
                    "✓".green(),
                    action.target,
                    action.action,
                    action.problem.dimmed()
                ),
                HealingOutcome::Failed { reason } => format!(
                    "  {} {:<24} {} failed: {}",
                    "✗".red(),
                    action.target,
                    action.action,
                    reason.red()
                ),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn action(target: &str, outcome: HealingOutcome) -> HealingAction {
        HealingAction {
            target: target.to_string(),
            problem: "directory missing".to_string(),
            action: "created directory".to_string(),
            outcome,
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("last-healing.json");
        let report = HealingReport::new(vec![action("models", HealingOutcome::Succeeded)]);

        report.save(&path).unwrap();
        let loaded = HealingReport::load(&path).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_render_counts_failures() {
        colored::control::set_override(false);
        let report = HealingReport::new(vec![
            action("models", HealingOutcome::Succeeded),
            action(
                "reports",
                HealingOutcome::Failed {
                    reason: "read-only filesystem".to_string(),
                },
            ),
        ]);

        let text = report.render();
        assert!(text.contains("2 total, 1 failed"));
        assert!(text.contains("read-only filesystem"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_render_clean() {
        colored::control::set_override(false);
        let report = HealingReport::new(Vec::new());
        assert!(report.is_clean());
        assert!(report.render().contains("nothing to heal"));
    }
}

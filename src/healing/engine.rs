//! Healing engine
//!
//! Best-effort: a failing repair is recorded and the pass continues, so
//! `heal` always returns the complete action list.

use super::{DependencyResolver, ExpectedLayout, Expectation, HealingAction, HealingOutcome};
use crate::capability::Presence;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Applies idempotent repairs for unmet layout expectations
#[derive(Clone)]
pub struct HealingEngine {
    resolver: Arc<dyn DependencyResolver>,
}

impl HealingEngine {
    pub fn new(resolver: Arc<dyn DependencyResolver>) -> Self {
        Self { resolver }
    }

    /// Check every expectation; repair the unmet ones
    pub async fn heal(&self, layout: &ExpectedLayout) -> Vec<HealingAction> {
        let mut actions = Vec::new();

        for expectation in &layout.expectations {
            if let Some(action) = self.heal_one(&layout.root, expectation).await {
                match &action.outcome {
                    HealingOutcome::Succeeded => info!("Healed {}: {}", action.target, action.action),
                    HealingOutcome::Failed { reason } => {
                        warn!("Could not heal {}: {}", action.target, reason)
                    }
                }
                actions.push(action);
            }
        }

        actions
    }

    async fn heal_one(&self, root: &Path, expectation: &Expectation) -> Option<HealingAction> {
        let target = expectation.target();

        match expectation {
            Expectation::Directory { path } => {
                let full = root.join(path);
                if full.is_dir() {
                    return None;
                }
                Some(record(
                    target,
                    "directory missing",
                    "created directory",
                    std::fs::create_dir_all(&full).map_err(|e| e.to_string()),
                ))
            }
            Expectation::SampleDataset { path, contents } => {
                let full = root.join(path);
                if full.exists() {
                    return None;
                }
                Some(record(
                    target,
                    "sample dataset missing",
                    "created sample dataset",
                    create_new_file(&full, contents),
                ))
            }
            Expectation::ConfigFile { path, contents } => {
                let full = root.join(path);
                if full.exists() {
                    return None;
                }
                Some(record(
                    target,
                    "config file missing",
                    "created config file from defaults",
                    create_new_file(&full, contents),
                ))
            }
            Expectation::Dependency { module, package } => {
                match self.resolver.is_importable(module).await {
                    Presence::Present { .. } => None,
                    Presence::Unknown { reason } => {
                        // Cannot tell whether it is missing; leave it alone
                        warn!("Skipping dependency {}: {}", package, reason);
                        None
                    }
                    Presence::Absent => Some(record(
                        target,
                        &format!("module '{}' not importable", module),
                        &format!("installed package {}", package),
                        self.resolver.install(package).await.map_err(|e| e.to_string()),
                    )),
                }
            }
        }
    }
}

fn record(
    target: String,
    problem: &str,
    action: &str,
    result: std::result::Result<(), String>,
) -> HealingAction {
    HealingAction {
        target,
        problem: problem.to_string(),
        action: action.to_string(),
        outcome: match result {
            Ok(()) => HealingOutcome::Succeeded,
            Err(reason) => HealingOutcome::Failed { reason },
        },
    }
}

/// Create `path` with `contents`; never touches an existing file
fn create_new_file(path: &Path, contents: &str) -> std::result::Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        // Appeared between the check and the create: someone else healed it
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(()),
        Err(e) => return Err(e.to_string()),
    };

    file.write_all(contents.as_bytes()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{OrchestratorError, Result};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Resolver whose installed set lives in memory
    #[derive(Default)]
    struct FakeResolver {
        installed: Mutex<HashSet<String>>,
        broken: HashSet<String>,
        installs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DependencyResolver for FakeResolver {
        async fn is_importable(&self, module: &str) -> Presence {
            if self.installed.lock().unwrap().contains(module) {
                Presence::present()
            } else {
                Presence::Absent
            }
        }

        async fn install(&self, package: &str) -> Result<()> {
            self.installs.lock().unwrap().push(package.to_string());
            if self.broken.contains(package) {
                return Err(OrchestratorError::Generic("index unreachable".to_string()));
            }
            self.installed.lock().unwrap().insert(package.to_string());
            Ok(())
        }
    }

    fn layout(root: &Path) -> ExpectedLayout {
        ExpectedLayout::new(root)
            .expect(Expectation::Directory {
                path: PathBuf::from("data/raw"),
            })
            .expect(Expectation::SampleDataset {
                path: PathBuf::from("data/raw/data.csv"),
                contents: "a,b\n1,2\n".to_string(),
            })
            .expect(Expectation::Dependency {
                module: "pandas".to_string(),
                package: "pandas".to_string(),
            })
            .expect(Expectation::ConfigFile {
                path: PathBuf::from("config.yaml"),
                contents: "project: {}\n".to_string(),
            })
    }

    #[tokio::test]
    async fn test_heal_repairs_everything_once() {
        let root = TempDir::new().unwrap();
        let resolver = Arc::new(FakeResolver::default());
        let engine = HealingEngine::new(resolver.clone());

        let first = engine.heal(&layout(root.path())).await;
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|a| a.succeeded()));
        assert!(root.path().join("data/raw/data.csv").is_file());
        assert!(root.path().join("config.yaml").is_file());

        let second = engine.heal(&layout(root.path())).await;
        assert!(second.is_empty());
        assert_eq!(resolver.installs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_files_never_overwritten() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("config.yaml"), "custom: true\n").unwrap();

        let engine = HealingEngine::new(Arc::new(FakeResolver::default()));
        let actions = engine.heal(&layout(root.path())).await;

        assert!(actions.iter().all(|a| a.target != "config.yaml"));
        assert_eq!(
            std::fs::read_to_string(root.path().join("config.yaml")).unwrap(),
            "custom: true\n"
        );
    }

    #[tokio::test]
    async fn test_failed_install_recorded_and_pass_continues() {
        let root = TempDir::new().unwrap();
        let resolver = FakeResolver {
            broken: ["pandas".to_string()].into_iter().collect(),
            ..FakeResolver::default()
        };
        let engine = HealingEngine::new(Arc::new(resolver));

        let actions = engine.heal(&layout(root.path())).await;
        assert_eq!(actions.len(), 4);

        let failed: Vec<_> = actions.iter().filter(|a| !a.succeeded()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, "pandas");
        assert!(root.path().join("config.yaml").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_root_yields_failed_actions() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let locked = root.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores permission bits
        if std::fs::write(locked.join("probe"), "x").is_ok() {
            return;
        }

        let layout = ExpectedLayout::new(&locked).expect(Expectation::Directory {
            path: PathBuf::from("models"),
        });
        let engine = HealingEngine::new(Arc::new(FakeResolver::default()));
        let actions = engine.heal(&layout).await;

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(!actions[0].succeeded());
    }
}

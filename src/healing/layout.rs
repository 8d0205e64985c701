//! Expected project layout

use super::Expectation;
use crate::config::EffectiveConfig;
use std::path::{Path, PathBuf};

/// Working directories every project needs, relative to the root
pub const STANDARD_DIRECTORIES: &[&str] = &["data/raw", "data/processed", "models", "reports", "logs"];

/// `(module, package)` pairs the app server cannot start without
pub const CRITICAL_DEPENDENCIES: &[(&str, &str)] = &[
    ("fastapi", "fastapi"),
    ("uvicorn", "uvicorn"),
    ("pandas", "pandas"),
    ("sklearn", "scikit-learn"),
];

pub const SAMPLE_DATASET: &str = "feature_1,feature_2,feature_3,target\n\
0.1,0.2,0.3,1\n\
0.4,0.5,0.6,0\n\
0.7,0.8,0.9,1\n";

/// Expectations checked against a project root, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedLayout {
    pub root: PathBuf,
    pub expectations: Vec<Expectation>,
}

impl ExpectedLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            expectations: Vec::new(),
        }
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    /// Standard layout for the synthesized configuration
    pub fn standard(config: &EffectiveConfig) -> Self {
        let root = config.paths.base.clone();
        let mut layout = Self::new(root.clone());

        for dir in STANDARD_DIRECTORIES {
            layout = layout.expect(Expectation::Directory {
                path: PathBuf::from(dir),
            });
        }

        layout = layout.expect(Expectation::SampleDataset {
            path: relative_to(&root, &config.paths.sample_dataset),
            contents: SAMPLE_DATASET.to_string(),
        });

        for (module, package) in CRITICAL_DEPENDENCIES {
            layout = layout.expect(Expectation::Dependency {
                module: module.to_string(),
                package: package.to_string(),
            });
        }

        layout.expect(Expectation::ConfigFile {
            path: relative_to(&root, &config.paths.config_file),
            contents: config_template(config),
        })
    }

    /// Only the runtime dependencies
    pub fn dependencies_only(mut self) -> Self {
        self.expectations
            .retain(|e| matches!(e, Expectation::Dependency { .. }));
        self
    }
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Initial `config.yaml` written when none exists
fn config_template(config: &EffectiveConfig) -> String {
    format!(
        "project:\n  name: {name}\n  version: {version}\n\
api:\n  version: {prefix}\n  host: {host}\n  port: {port}\n\
paths:\n  models_dir: models\n  model_filename: model.joblib\n  preprocessor_filename: preprocessor.joblib\n  data_raw: data/raw/data.csv\n  data_processed: data/processed/data.csv\n\
data:\n  test_size: 0.2\n  random_state: 42\n  target_column: target\n\
llm:\n  enabled: {llm}\n  model: {model}\n  api_base: {base_url}\n",
        name = config.project.name,
        version = config.project.version,
        prefix = config.server.api_prefix,
        host = config.server.host,
        port = config.server.port,
        llm = config.inference.enabled,
        model = config.inference.model,
        base_url = config.inference.base_url,
    )
}

//! Module enumeration and batch loading.
//!
//! Loading never aborts the batch in the default mode: failures are
//! partitioned into the failed set and reported, the rest of the batch is
//! still attempted. Strict mode aborts on the first failure.

use crate::engine::error::EngineError;
use crate::engine::traits::EngineInstance;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A loadable unit of engine functionality, immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub bin_path: PathBuf,
    pub data_path: PathBuf,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, bin_path: impl Into<PathBuf>, data_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            bin_path: bin_path.into(),
            data_path: data_path.into(),
        }
    }
}

/// A module that failed to load, with the reason it was kept out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedModule {
    pub descriptor: ModuleDescriptor,
    pub reason: String,
}

/// Outcome of a batch load: loaded and failed partition the attempted set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<ModuleDescriptor>,
    pub failed: Vec<FailedModule>,
}

impl LoadReport {
    pub fn attempted(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }
}

/// Load `modules` into `instance`, skipping `excluded` names entirely.
///
/// Excluded modules never appear in either output set. With `strict` set, the
/// first failure aborts the whole batch with [`EngineError::BatchLoad`].
pub async fn load_modules(
    instance: &mut dyn EngineInstance,
    modules: Vec<ModuleDescriptor>,
    excluded: &[String],
    strict: bool,
) -> Result<LoadReport, EngineError> {
    let mut report = LoadReport::default();

    for module in modules {
        if excluded.iter().any(|name| *name == module.name) {
            continue;
        }

        match instance.load_module(&module).await {
            Ok(()) => {
                info!("loaded module '{}'", module.name);
                report.loaded.push(module);
            }
            Err(err) if strict => {
                return Err(EngineError::BatchLoad {
                    module: module.name,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                warn!("module '{}' failed to load: {}", module.name, err);
                report.failed.push(FailedModule {
                    descriptor: module,
                    reason: err.to_string(),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sim::SimEngine;
    use crate::engine::traits::{InstanceOptions, MediaEngine};

    fn descriptors(names: &[&str]) -> Vec<ModuleDescriptor> {
        names
            .iter()
            .map(|n| ModuleDescriptor::new(*n, format!("plugins/{n}"), format!("data/{n}")))
            .collect()
    }

    #[tokio::test]
    async fn test_excluded_modules_never_load() {
        let engine = SimEngine::new();
        let mut instance = engine
            .create_instance("en-US", InstanceOptions::default())
            .await
            .unwrap();

        let modules = instance.enumerate_modules().await.unwrap();
        let excluded = vec!["obs-websocket".to_string(), "frontend-tools".to_string()];
        let report = load_modules(&mut *instance, modules.clone(), &excluded, false)
            .await
            .unwrap();

        for name in &excluded {
            assert!(report.loaded.iter().all(|m| m.name != *name));
            assert!(report.failed.iter().all(|m| m.descriptor.name != *name));
        }
        assert_eq!(report.attempted(), modules.len() - excluded.len());
    }

    #[tokio::test]
    async fn test_partition_is_exact_and_disjoint() {
        let engine = SimEngine::new().with_unloadable_module("win-mf");
        let mut instance = engine
            .create_instance("en-US", InstanceOptions::default())
            .await
            .unwrap();

        let modules = instance.enumerate_modules().await.unwrap();
        let total = modules.len();
        let report = load_modules(&mut *instance, modules, &[], false)
            .await
            .unwrap();

        assert_eq!(report.attempted(), total);
        for failed in &report.failed {
            assert!(
                report.loaded.iter().all(|m| m.name != failed.descriptor.name),
                "module '{}' appears in both sets",
                failed.descriptor.name
            );
        }
    }

    #[tokio::test]
    async fn test_one_bad_module_does_not_abort_batch() {
        // one deliberately-unloadable module among loadable ones
        let engine = SimEngine::new().with_unloadable_module("win-mf");
        let mut instance = engine
            .create_instance("en-US", InstanceOptions::default())
            .await
            .unwrap();

        let modules = instance.enumerate_modules().await.unwrap();
        let total = modules.len();
        let report = load_modules(&mut *instance, modules, &[], false)
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].descriptor.name, "win-mf");
        assert_eq!(report.loaded.len(), total - 1);
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_on_first_failure() {
        let engine = SimEngine::new().with_unloadable_module("win-mf");
        let mut instance = engine
            .create_instance("en-US", InstanceOptions::default())
            .await
            .unwrap();

        let modules = instance.enumerate_modules().await.unwrap();
        let err = load_modules(&mut *instance, modules, &[], true)
            .await
            .unwrap_err();

        match err {
            EngineError::BatchLoad { module, .. } => assert_eq!(module, "win-mf"),
            other => panic!("expected BatchLoad, got {other}"),
        }
    }
}

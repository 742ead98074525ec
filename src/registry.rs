// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::shared::error::{FleetError, FleetResult, ValidationError};
use crate::target::{TargetConfig, TargetUpdate};

/// Known targets by unique name.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, TargetConfig>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TargetConfig>> {
        self.targets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TargetConfig>> {
        self.targets.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, target: TargetConfig) -> FleetResult<()> {
        target.validate()?;

        let mut targets = self.write();
        if targets.contains_key(&target.name) {
            return Err(ValidationError::duplicate("target name", &target.name).into());
        }
        debug!("Registered target {}", target);
        targets.insert(target.name.clone(), target);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> FleetResult<TargetConfig> {
        let removed = self
            .write()
            .remove(name)
            .ok_or_else(|| FleetError::target_not_found(name))?;
        debug!("Removed target {}", removed);
        Ok(removed)
    }

    /// Apply `update` and return `(previous, updated)`.
    pub fn update(
        &self,
        name: &str,
        update: &TargetUpdate,
    ) -> FleetResult<(TargetConfig, TargetConfig)> {
        let mut targets = self.write();
        let current = targets
            .get_mut(name)
            .ok_or_else(|| FleetError::target_not_found(name))?;

        let updated = update.apply_to(current);
        updated.validate()?;
        let previous = std::mem::replace(current, updated.clone());
        Ok((previous, updated))
    }

    pub fn get(&self, name: &str) -> Option<TargetConfig> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Look up every name, failing on the first unknown one.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> FleetResult<Vec<TargetConfig>> {
        let targets = self.read();
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                targets
                    .get(name)
                    .cloned()
                    .ok_or_else(|| FleetError::target_not_found(name))
            })
            .collect()
    }

    /// All targets sorted by name.
    pub fn list(&self) -> Vec<TargetConfig> {
        let mut targets: Vec<_> = self.read().values().cloned().collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        targets
    }

    pub fn list_by_tag(&self, tag: &str) -> Vec<TargetConfig> {
        self.list().into_iter().filter(|t| t.has_tag(tag)).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::AuthMethod;

    fn target(name: &str) -> TargetConfig {
        TargetConfig::new(name, "10.0.0.1", 22, "ops", AuthMethod::with_password("pw"))
    }

    #[test]
    fn test_add_rejects_duplicates_and_invalid_targets() {
        let registry = TargetRegistry::new();
        registry.add(target("web1")).unwrap();

        let err = registry.add(target("web1")).unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let mut bad = target("web2");
        bad.port = 0;
        assert!(registry.add(bad).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_validates_and_returns_both_versions() {
        let registry = TargetRegistry::new();
        registry.add(target("web1")).unwrap();

        let update = TargetUpdate {
            port: Some(2222),
            ..Default::default()
        };
        let (before, after) = registry.update("web1", &update).unwrap();
        assert_eq!(before.port, 22);
        assert_eq!(after.port, 2222);
        assert_eq!(registry.get("web1").unwrap().port, 2222);

        let bad = TargetUpdate {
            host: Some(String::new()),
            ..Default::default()
        };
        assert!(registry.update("web1", &bad).is_err());
        assert_eq!(registry.get("web1").unwrap().host, "10.0.0.1");

        assert!(matches!(
            registry.update("nope", &update),
            Err(FleetError::NotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_and_list() {
        let registry = TargetRegistry::new();
        registry.add(target("b").with_tags(["db"])).unwrap();
        registry.add(target("a")).unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.list_by_tag("db").len(), 1);

        assert_eq!(registry.resolve(&["b", "a"]).unwrap()[0].name, "b");
        assert!(registry.resolve(&["a", "zzz"]).is_err());

        registry.remove("a").unwrap();
        assert!(registry.remove("a").is_err());
        assert!(!registry.contains("a"));
    }
}

//! Resource Registry - Load describer definitions from JSON
//!
//! This module loads all resource type definitions from embedded JSON files
//! and provides lookup functions for the rest of the application. The
//! registry is immutable lookup data; it holds no clients or connections.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/containers.json"),
    include_str!("../resources/scm.json"),
    include_str!("../resources/managed.json"),
];

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    /// Provider module that serves this resource type
    pub provider: String,
    pub list_method: String,
    /// Method for describing one resource by id, if supported
    #[serde(default)]
    pub get_method: Option<String>,
    /// Optional parent the listing can be narrowed to (e.g. `app`)
    #[serde(default)]
    pub scope_param: Option<String>,
    /// `kind` tag of the produced descriptions
    pub kind: String,
}

impl ResourceDef {
    pub fn supports_get(&self) -> bool {
        self.get_method.is_some()
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDef>,
}

/// Registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: BTreeMap::new(),
        };

        for content in RESOURCE_FILES {
            // Embedded at compile time and covered by tests
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect()
}

/// Providers that serve at least one resource, sorted
pub fn get_all_providers() -> Vec<&'static str> {
    let providers: BTreeSet<&'static str> = get_registry()
        .resources
        .values()
        .map(|def| def.provider.as_str())
        .collect();
    providers.into_iter().collect()
}

/// Resource keys served by one provider
pub fn get_provider_resource_keys(provider: &str) -> Vec<&'static str> {
    get_registry()
        .resources
        .iter()
        .filter(|(_, def)| def.provider == provider)
        .map(|(key, _)| key.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.resources.is_empty(),
            "Registry should have resources"
        );
    }

    #[test]
    fn test_container_machines_resource_exists() {
        let resource = get_resource("container-machines");
        assert!(
            resource.is_some(),
            "Container machines resource should exist"
        );

        let resource = resource.unwrap();
        assert_eq!(resource.display_name, "Machines");
        assert_eq!(resource.provider, "containers");
        assert!(resource.supports_get());
        assert_eq!(resource.scope_param.as_deref(), Some("app"));
    }

    #[test]
    fn test_get_all_resource_keys() {
        let keys = get_all_resource_keys();
        assert_eq!(keys.len(), 8);
        assert!(
            keys.contains(&"scm-repositories"),
            "Should contain scm-repositories"
        );
    }

    #[test]
    fn test_every_key_belongs_to_one_provider() {
        assert_eq!(get_all_providers(), vec!["containers", "managed", "scm"]);

        let grouped: usize = get_all_providers()
            .into_iter()
            .map(|provider| get_provider_resource_keys(provider).len())
            .sum();
        assert_eq!(grouped, get_all_resource_keys().len());
    }

    #[test]
    fn test_kinds_are_unique_per_resource() {
        let kinds: BTreeSet<&str> = get_all_resource_keys()
            .into_iter()
            .filter_map(get_resource)
            .map(|def| def.kind.as_str())
            .collect();
        assert_eq!(kinds.len(), get_all_resource_keys().len());
        assert!(kinds.contains("container_machine"));
    }

    #[test]
    fn test_provider_resource_keys() {
        let keys = get_provider_resource_keys("managed");
        assert_eq!(keys, vec!["managed-models", "managed-services"]);
    }
}

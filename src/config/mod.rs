//! Project configuration (`berth.yaml`).
//!
//! ```yaml
//! project: shop
//! tld: test            # optional, defaults to "test"
//! services:
//!   web:
//!     ports: [80]
//!     main: true       # optional
//!   worker:
//!     role: worker     # optional, overrides the name heuristic
//!   db:
//!     ports: [5432]
//! ```

use crate::error::{Error, Result};
use crate::identity::{ServiceRole, ServiceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "berth.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tld: Option<String>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceDecl>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDecl {
    /// Container ports the service listens on.
    #[serde(default)]
    pub ports: Vec<u16>,

    /// Explicit role, overriding the name/port heuristics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ServiceRole>,

    /// Marks the service that answers on the bare project domain.
    #[serde(default)]
    pub main: bool,
}

impl ProjectConfig {
    /// The effective TLD for this project.
    pub fn tld(&self) -> &str {
        self.tld.as_deref().unwrap_or("test")
    }

    /// Flatten declarations into specs, sorted by service name.
    pub fn service_specs(&self) -> Vec<ServiceSpec> {
        self.services
            .iter()
            .map(|(name, decl)| ServiceSpec {
                name: name.clone(),
                container_ports: decl.ports.clone(),
                role: decl.role,
                main: decl.main,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            return Err(Error::Config("project name cannot be empty".to_string()));
        }
        if !self
            .project
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::Config(format!(
                "project name '{}' must be lowercase alphanumeric with dashes (it becomes a DNS label)",
                self.project
            )));
        }
        if self.project.starts_with('-') || self.project.ends_with('-') {
            return Err(Error::Config(format!(
                "project name '{}' cannot start or end with a dash",
                self.project
            )));
        }
        let tld = self.tld();
        if tld.is_empty() || !tld.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(Error::Config(format!(
                "tld '{}' must be a bare lowercase label like 'test'",
                tld
            )));
        }

        let mains: Vec<&String> = self
            .services
            .iter()
            .filter(|(_, d)| d.main)
            .map(|(n, _)| n)
            .collect();
        if mains.len() > 1 {
            return Err(Error::Config(format!(
                "only one service may be marked main, found: {}",
                mains
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        for (name, decl) in &self.services {
            if name.is_empty() {
                return Err(Error::Config("service name cannot be empty".to_string()));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            {
                return Err(Error::Config(format!(
                    "service name '{}' must be lowercase alphanumeric with dashes",
                    name
                )));
            }
            if decl.ports.contains(&0) {
                return Err(Error::Config(format!(
                    "service '{}' declares port 0, which cannot be mapped",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config: ProjectConfig = serde_yaml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Walk upward from `start` looking for a `berth.yaml`.
pub fn find_config_file(start: &Path) -> Result<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        dir = current.parent();
    }
    Err(Error::ProjectNotFound(format!(
        "no {} found in {} or any parent directory",
        CONFIG_FILE_NAME,
        start.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ProjectConfig {
        serde_yaml::from_str(yaml).expect("parse")
    }

    #[test]
    fn parses_minimal_config() {
        let config = parse("project: shop\nservices:\n  web:\n    ports: [80]\n");
        assert_eq!(config.project, "shop");
        assert_eq!(config.tld(), "test");
        assert_eq!(config.services["web"].ports, vec![80]);
        config.validate().expect("valid");
    }

    #[test]
    fn parses_roles_and_main() {
        let config = parse(
            "project: shop\nservices:\n  api:\n    ports: [8080]\n    main: true\n  crunch:\n    role: worker\n",
        );
        let specs = config.service_specs();
        let api = specs.iter().find(|s| s.name == "api").expect("api");
        assert!(api.main);
        let crunch = specs.iter().find(|s| s.name == "crunch").expect("crunch");
        assert_eq!(crunch.role, Some(ServiceRole::Worker));
    }

    #[test]
    fn rejects_two_main_services() {
        let config = parse(
            "project: shop\nservices:\n  a:\n    ports: [80]\n    main: true\n  b:\n    ports: [80]\n    main: true\n",
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_project_names() {
        for bad in ["", "Shop", "my shop", "-shop", "shop-"] {
            let config = ProjectConfig {
                project: bad.to_string(),
                tld: None,
                services: BTreeMap::new(),
            };
            assert!(config.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn rejects_port_zero() {
        let config = parse("project: shop\nservices:\n  web:\n    ports: [0]\n");
        assert!(config.validate().is_err());
    }

    #[test]
    fn finds_config_upward() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(dir.path().join(CONFIG_FILE_NAME), "project: x\n").expect("write");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(find_config_file(dir.path()).is_err());
    }
}

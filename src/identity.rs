//! DNS names and vhost identifiers for a project's services.
//!
//! Everything in this module is a pure function of the project name, the
//! declared services and the TLD. Subdomains are deterministic; project names
//! are unique keys, so there is no collision handling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a service is for, decided once at declaration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Web,
    Worker,
    Database,
    Admin,
    Unknown,
}

/// Name keywords that mark a service as web-facing.
const WEB_NAME_TOKENS: &[&str] = &[
    "web", "app", "frontend", "front", "ui", "site", "www", "http", "nginx", "apache",
];

/// Name keywords for background workers.
const WORKER_NAME_TOKENS: &[&str] = &["worker", "queue", "jobs", "cron", "scheduler"];

/// Name keywords for data stores.
const DATABASE_NAME_TOKENS: &[&str] = &[
    "db", "database", "postgres", "mysql", "mariadb", "mongo", "redis", "memcached",
];

/// Known admin/side-tool UIs (mail catchers, DB admin panels). These stay off
/// the primary URL list unless they sit on a conventional web port.
const ADMIN_NAME_TOKENS: &[&str] = &[
    "mailhog", "mailpit", "adminer", "phpmyadmin", "pgadmin", "kibana", "redisinsight",
];

/// Container ports conventionally served over HTTP.
pub const CONVENTIONAL_WEB_PORTS: &[u16] = &[80, 443, 3000, 4200, 5173, 8000, 8080, 8888];

/// The well-known web port, which gets special treatment during allocation.
pub const WELL_KNOWN_WEB_PORT: u16 = 80;

/// A service as declared by the caller: name, container ports, and an
/// optional explicit role/main designation that overrides the heuristics.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub container_ports: Vec<u16>,
    pub role: Option<ServiceRole>,
    pub main: bool,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, container_ports: Vec<u16>) -> Self {
        Self {
            name: name.into(),
            container_ports,
            role: None,
            main: false,
        }
    }

    /// The declared role if present, else the name-keyword heuristic.
    pub fn role(&self) -> ServiceRole {
        if let Some(role) = self.role {
            return role;
        }
        classify_name(&self.name)
    }

    /// Web-facing means it should get a DNS name and a proxy route: either
    /// the name says so, or a container port matches the conventional set.
    pub fn is_web_facing(&self) -> bool {
        if matches!(self.role(), ServiceRole::Web) {
            return true;
        }
        if matches!(self.role(), ServiceRole::Worker | ServiceRole::Database) {
            // An explicit non-web role wins over port coincidence.
            return false;
        }
        self.has_conventional_web_port()
    }

    pub fn has_conventional_web_port(&self) -> bool {
        self.container_ports
            .iter()
            .any(|p| CONVENTIONAL_WEB_PORTS.contains(p))
    }

    /// The container port the proxy should forward to: the first conventional
    /// web port, else the first declared port.
    pub fn web_port(&self) -> Option<u16> {
        self.container_ports
            .iter()
            .copied()
            .find(|p| CONVENTIONAL_WEB_PORTS.contains(p))
            .or_else(|| self.container_ports.first().copied())
    }

    /// Admin side-tools are excluded from the reachable-URL list unless they
    /// are themselves on a conventional web port.
    pub fn is_url_listed(&self) -> bool {
        if !self.is_web_facing() {
            return false;
        }
        if matches!(self.role(), ServiceRole::Admin) {
            return self.has_conventional_web_port();
        }
        true
    }
}

fn classify_name(name: &str) -> ServiceRole {
    let lower = name.to_ascii_lowercase();
    let contains_any = |tokens: &[&str]| tokens.iter().any(|t| lower.contains(t));

    // Admin tools first: "phpmyadmin" also contains "php" and would otherwise
    // slip through later buckets.
    if contains_any(ADMIN_NAME_TOKENS) {
        ServiceRole::Admin
    } else if contains_any(DATABASE_NAME_TOKENS) {
        ServiceRole::Database
    } else if contains_any(WORKER_NAME_TOKENS) {
        ServiceRole::Worker
    } else if contains_any(WEB_NAME_TOKENS) {
        ServiceRole::Web
    } else {
        ServiceRole::Unknown
    }
}

/// The derived network identity of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectNetworkIdentity {
    pub project: String,
    pub tld: String,
    /// `<project>.<tld>` - the bare domain the main service answers on.
    pub primary_domain: String,
    /// service name -> fully qualified domain. The main service maps to the
    /// bare primary domain; other web-facing services to
    /// `<service>.<project>.<tld>`. Non-web services are absent.
    pub service_domains: BTreeMap<String, String>,
    pub main_service: Option<String>,
}

impl ProjectNetworkIdentity {
    /// All domains that need DNS records and proxy routes, sorted and unique.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.service_domains.values().cloned().collect();
        domains.sort();
        domains.dedup();
        domains
    }
}

/// Derive the network identity for a project.
///
/// Pure: no I/O, no randomness. Calling twice with the same inputs yields
/// byte-identical output.
pub fn derive(project: &str, services: &[ServiceSpec], tld: &str) -> ProjectNetworkIdentity {
    let primary_domain = format!("{}.{}", project, tld);

    let main_service = pick_main_service(services);

    let mut service_domains = BTreeMap::new();
    for spec in services {
        if !spec.is_web_facing() {
            continue;
        }
        let domain = if Some(spec.name.as_str()) == main_service.as_deref() {
            primary_domain.clone()
        } else {
            format!("{}.{}", spec.name, primary_domain)
        };
        service_domains.insert(spec.name.clone(), domain);
    }

    ProjectNetworkIdentity {
        project: project.to_string(),
        tld: tld.to_string(),
        primary_domain,
        service_domains,
        main_service,
    }
}

/// The designated main service: explicit flag wins; otherwise prefer a
/// service literally named `web` or `app`, then the lexicographically first
/// web-facing one. Deterministic by construction.
fn pick_main_service(services: &[ServiceSpec]) -> Option<String> {
    if let Some(spec) = services.iter().find(|s| s.main) {
        return Some(spec.name.clone());
    }
    for preferred in ["web", "app"] {
        if let Some(spec) = services
            .iter()
            .find(|s| s.name == preferred && s.is_web_facing())
        {
            return Some(spec.name.clone());
        }
    }
    let mut web: Vec<&ServiceSpec> = services.iter().filter(|s| s.is_web_facing()).collect();
    web.sort_by(|a, b| a.name.cmp(&b.name));
    web.first().map(|s| s.name.clone())
}

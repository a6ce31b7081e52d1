//! Project health aggregation.
//!
//! Raw per-service container states fold into one canonical project status.
//! The mapping is total: every combination of runtime answers lands on
//! exactly one overall status, including the degenerate ones (no services
//! declared, no runtime, runtime query failed). Status is derived on demand
//! and never trusted beyond its probe's freshness.

use crate::certs;
use crate::context::NetContext;
use crate::dns::DnsReconciler;
use crate::identity::{ProjectNetworkIdentity, ServiceSpec};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// One container's classified state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
    Unhealthy,
}

/// Canonical project-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    Running,
    Partial,
    Stopped,
    NoServices,
    NoDocker,
    DockerError,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Running => "running",
            OverallStatus::Partial => "partial",
            OverallStatus::Stopped => "stopped",
            OverallStatus::NoServices => "no-services",
            OverallStatus::NoDocker => "no-docker",
            OverallStatus::DockerError => "docker-error",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub state: ServiceState,
    /// Published `(containerPort, hostPort)` pairs reported by the runtime.
    pub published: Vec<(u16, u16)>,
    /// Reachability URL for web-facing services.
    pub url: Option<String>,
    /// Filled by [`HealthAggregator::verify_urls`]; `None` until checked.
    pub reachable: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project: String,
    pub overall: OverallStatus,
    pub services: Vec<ServiceHealth>,
    pub probed_at: DateTime<Utc>,
}

/// Fold service counts into the one overall status. Total by construction.
pub fn fold_overall(running: usize, total: usize) -> OverallStatus {
    if total == 0 {
        OverallStatus::NoServices
    } else if running == total {
        OverallStatus::Running
    } else if running > 0 {
        OverallStatus::Partial
    } else {
        OverallStatus::Stopped
    }
}

/// Derives project status from the container runtime plus the DNS/proxy
/// outputs when they are available.
pub struct HealthAggregator<'a> {
    ctx: &'a NetContext,
}

impl<'a> HealthAggregator<'a> {
    pub fn new(ctx: &'a NetContext) -> Self {
        Self { ctx }
    }

    /// Probe the runtime and derive the project's status.
    pub async fn probe(
        &self,
        project: &str,
        specs: &[ServiceSpec],
        identity: &ProjectNetworkIdentity,
    ) -> ProjectStatus {
        let probed_at = Utc::now();

        if !self.ctx.docker.daemon_healthy(Duration::from_secs(3)).await {
            return ProjectStatus {
                project: project.to_string(),
                overall: OverallStatus::NoDocker,
                services: Vec::new(),
                probed_at,
            };
        }

        let raw = match self.ctx.docker.compose_ps_json(project).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("compose state query failed for {}: {}", project, e);
                return ProjectStatus {
                    project: project.to_string(),
                    overall: OverallStatus::DockerError,
                    services: Vec::new(),
                    probed_at,
                };
            }
        };

        let records = parse_compose_records(&raw);
        let services = self.classify(project, specs, identity, records);

        let total = services.len();
        let running = services
            .iter()
            .filter(|s| s.state == ServiceState::Running)
            .count();

        ProjectStatus {
            project: project.to_string(),
            overall: fold_overall(running, total),
            services,
            probed_at,
        }
    }

    fn classify(
        &self,
        project: &str,
        specs: &[ServiceSpec],
        identity: &ProjectNetworkIdentity,
        records: Vec<ComposeRecord>,
    ) -> Vec<ServiceHealth> {
        let dns_installed = DnsReconciler::new(self.ctx).fragment_installed(project);
        let secure = certs::wildcard_present(&self.ctx.dirs, &identity.tld);

        let mut by_name: BTreeMap<String, ComposeRecord> = records
            .into_iter()
            .map(|r| (r.service.clone(), r))
            .collect();

        let mut services = Vec::new();

        // Declared services first, in declaration order; anything the runtime
        // reports beyond the declaration is appended after.
        for spec in specs {
            let record = by_name.remove(&spec.name);
            services.push(self.one_service(spec, record, identity, dns_installed, secure));
        }
        for (_, record) in by_name {
            let spec = ServiceSpec::new(record.service.clone(), publisher_targets(&record));
            services.push(self.one_service(&spec, Some(record), identity, dns_installed, secure));
        }
        services
    }

    fn one_service(
        &self,
        spec: &ServiceSpec,
        record: Option<ComposeRecord>,
        identity: &ProjectNetworkIdentity,
        dns_installed: bool,
        secure: bool,
    ) -> ServiceHealth {
        let (state, published) = match record {
            Some(record) => (record.state(), record.publishers),
            None => (ServiceState::Stopped, Vec::new()),
        };

        let url = if state == ServiceState::Running && spec.is_url_listed() {
            build_url(spec, identity, &published, dns_installed, secure)
        } else {
            None
        };

        ServiceHealth {
            name: spec.name.clone(),
            state,
            published,
            url,
            reachable: None,
        }
    }

    /// Best-effort reachability check of every generated URL. Failures only
    /// mark the flag; they never change the overall status.
    pub async fn verify_urls(&self, status: &mut ProjectStatus) {
        for service in &mut status.services {
            let Some(url) = service.url.clone() else {
                continue;
            };
            if url::Url::parse(&url).is_err() {
                service.reachable = Some(false);
                continue;
            }
            let client = shared_client();
            let reachable = match client
                .get(&url)
                .timeout(Duration::from_secs(2))
                .send()
                .await
            {
                Ok(response) => !response.status().is_server_error(),
                Err(_) => false,
            };
            service.reachable = Some(reachable);
        }
    }
}

/// Shared HTTP client so repeated probes reuse one connection pool.
fn shared_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default()
    })
}

fn build_url(
    spec: &ServiceSpec,
    identity: &ProjectNetworkIdentity,
    published: &[(u16, u16)],
    dns_installed: bool,
    secure: bool,
) -> Option<String> {
    if dns_installed {
        if let Some(domain) = identity.service_domains.get(&spec.name) {
            let scheme = if secure { "https" } else { "http" };
            return Some(format!("{}://{}", scheme, domain));
        }
    }

    // Raw host port fallback: the pair matching the service's web port, else
    // the first published pair.
    let web_port = spec.web_port();
    let host_port = published
        .iter()
        .find(|(container, _)| Some(*container) == web_port)
        .or_else(|| published.first())
        .map(|(_, host)| *host)?;
    Some(format!("http://localhost:{}", host_port))
}

// ============================================================================
// Compose record parsing
// ============================================================================

#[derive(Debug, Clone)]
struct ComposeRecord {
    service: String,
    state_raw: String,
    health: String,
    /// `(containerPort, hostPort)` pairs.
    publishers: Vec<(u16, u16)>,
}

impl ComposeRecord {
    fn state(&self) -> ServiceState {
        match self.state_raw.as_str() {
            "running" => {
                if self.health == "unhealthy" {
                    ServiceState::Unhealthy
                } else {
                    ServiceState::Running
                }
            }
            _ => ServiceState::Stopped,
        }
    }
}

fn publisher_targets(record: &ComposeRecord) -> Vec<u16> {
    record.publishers.iter().map(|(c, _)| *c).collect()
}

/// Parse `docker compose ps --format json` output.
///
/// Current compose emits one JSON object per line; some builds emit a single
/// array. Both are handled; unparseable lines are skipped.
fn parse_compose_records(raw: &str) -> Vec<ComposeRecord> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(values) => values.iter().filter_map(record_from_value).collect(),
            Err(_) => Vec::new(),
        }
    } else {
        trimmed
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
            .filter_map(|value| record_from_value(&value))
            .collect()
    }
}

fn record_from_value(value: &Value) -> Option<ComposeRecord> {
    let service = value
        .get("Service")
        .and_then(Value::as_str)
        .or_else(|| value.get("Name").and_then(Value::as_str))?
        .to_string();

    let state_raw = value
        .get("State")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();

    let health = value
        .get("Health")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();

    let publishers = match value.get("Publishers") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| {
                let target = entry.get("TargetPort").and_then(Value::as_u64)? as u16;
                let published = entry.get("PublishedPort").and_then(Value::as_u64)? as u16;
                // PublishedPort 0 means "exposed but not published".
                (published != 0).then_some((target, published))
            })
            .collect(),
        Some(Value::String(ports)) => parse_publisher_string(ports),
        _ => value
            .get("Ports")
            .and_then(Value::as_str)
            .map(parse_publisher_string)
            .unwrap_or_default(),
    };

    Some(ComposeRecord {
        service,
        state_raw,
        health,
        publishers,
    })
}

/// Parse the legacy textual port column, e.g.
/// `0.0.0.0:10001->5432/tcp, :::10001->5432/tcp`.
fn parse_publisher_string(ports: &str) -> Vec<(u16, u16)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?:\d{1,3}(?:\.\d{1,3}){3}):(\d+)->(\d+)/tcp").expect("port pattern")
    });

    let mut pairs: Vec<(u16, u16)> = pattern
        .captures_iter(ports)
        .filter_map(|caps| {
            let host = caps.get(1)?.as_str().parse::<u16>().ok()?;
            let target = caps.get(2)?.as_str().parse::<u16>().ok()?;
            Some((target, host))
        })
        .collect();
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

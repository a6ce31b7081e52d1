//! Reverse-proxy reconciliation.
//!
//! One route file per project in a shared `conf.d`, rendered from the
//! project's allocated ports and derived names, followed by a proxy reload.
//! The proxy itself is an external nginx container; this module only drives
//! its configuration toward the desired state.

use crate::context::NetContext;
use crate::error::{Error, Result};
use crate::fsio::{atomic_write, remove_if_exists};
use crate::identity::{ProjectNetworkIdentity, ServiceSpec};
use crate::ledger::ServicePortMap;
use std::fmt::Write as _;
use std::path::PathBuf;

pub const PROXY_CONTAINER: &str = "berth-proxy";
pub const PROXY_IMAGE: &str = "nginx:1.27-alpine";
/// Shared bridge network the proxy joins.
pub const PROXY_NETWORK: &str = "berth";
/// Upstream address the proxy dials to reach services published on the host.
const UPSTREAM_HOST: &str = "host.docker.internal";

/// Render model for one server block. Regenerated from the allocation and
/// the derived identity on every install, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMapping {
    pub service: String,
    pub domain: String,
    pub host_port: u16,
    /// The port the proxy forwards to. Equal to `host_port` while the proxy
    /// reaches services through the host; kept separate so a shared
    /// container-network deployment only changes the template.
    pub proxy_target_port: u16,
    pub is_main: bool,
}

/// Build the render model: one row per web-facing service that has an
/// allocated port.
pub fn build_mappings(
    identity: &ProjectNetworkIdentity,
    specs: &[ServiceSpec],
    allocation: &ServicePortMap,
) -> Vec<ServiceMapping> {
    let mut mappings = Vec::new();
    for spec in specs {
        let Some(domain) = identity.service_domains.get(&spec.name) else {
            continue;
        };
        let Some(container_port) = spec.web_port() else {
            continue;
        };
        let Some(host_port) = allocation
            .get(&spec.name)
            .and_then(|ports| ports.get(&container_port))
            .copied()
        else {
            continue;
        };
        mappings.push(ServiceMapping {
            service: spec.name.clone(),
            domain: domain.clone(),
            host_port,
            proxy_target_port: host_port,
            is_main: Some(spec.name.as_str()) == identity.main_service.as_deref(),
        });
    }
    // Main service first, then by domain, so the rendered file is stable.
    mappings.sort_by(|a, b| b.is_main.cmp(&a.is_main).then(a.domain.cmp(&b.domain)));
    mappings
}

/// Render the per-project route file: one server block per mapping.
pub fn render_routes(project: &str, mappings: &[ServiceMapping]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# managed by berth - project '{}'", project);
    for mapping in mappings {
        let _ = write!(
            out,
            "\nserver {{\n    listen 80;\n    server_name {domain};\n\n    location / {{\n        proxy_pass http://{upstream}:{port};\n        proxy_set_header Host $host;\n        proxy_set_header X-Real-IP $remote_addr;\n        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n        proxy_set_header X-Forwarded-Proto $scheme;\n        proxy_http_version 1.1;\n        proxy_set_header Upgrade $http_upgrade;\n        proxy_set_header Connection \"upgrade\";\n    }}\n}}\n",
            domain = mapping.domain,
            upstream = UPSTREAM_HOST,
            port = mapping.proxy_target_port,
        );
    }
    out
}

/// Keeps installed proxy routes in sync with allocated ports and names.
pub struct ProxyReconciler<'a> {
    ctx: &'a NetContext,
}

impl<'a> ProxyReconciler<'a> {
    pub fn new(ctx: &'a NetContext) -> Self {
        Self { ctx }
    }

    pub fn route_file(&self, project: &str) -> PathBuf {
        self.ctx
            .dirs
            .proxy_conf_dir()
            .join(format!("{}.conf", project))
    }

    /// Install (or refresh) a project's routes and reload the proxy.
    ///
    /// Returns warning-level errors: a failed reload does not undo the
    /// install, the route file stays on disk and the next successful reload
    /// picks it up.
    pub async fn install(
        &self,
        project: &str,
        mappings: &[ServiceMapping],
    ) -> Result<Vec<Error>> {
        self.ensure_proxy().await?;

        let rendered = render_routes(project, mappings);
        atomic_write(&self.route_file(project), &rendered)?;
        tracing::debug!(project, routes = mappings.len(), "installed proxy routes");

        Ok(self.reload_as_warning().await)
    }

    /// Remove a project's routes. Removal is a delete-and-reload; a missing
    /// file means there is nothing to do but the reload still runs so a
    /// half-removed state converges.
    pub async fn remove(&self, project: &str) -> Result<Vec<Error>> {
        let removed = remove_if_exists(&self.route_file(project))?;
        if !removed {
            tracing::debug!(project, "no proxy routes to remove");
        }
        if !self.ctx.docker.is_running(PROXY_CONTAINER).await {
            // Nothing to signal; the file is gone, which is the desired state.
            return Ok(Vec::new());
        }
        Ok(self.reload_as_warning().await)
    }

    /// Provision the proxy container if needed. Idempotent: running means
    /// no-op, stopped means start, absent means create.
    pub async fn ensure_proxy(&self) -> Result<()> {
        use crate::docker::ContainerState;

        self.ctx.docker.ensure_network(PROXY_NETWORK, None).await?;

        let conf_dir = self.ctx.dirs.proxy_conf_dir();
        std::fs::create_dir_all(&conf_dir)?;

        match self.ctx.docker.container_state(PROXY_CONTAINER).await? {
            ContainerState::Running => Ok(()),
            ContainerState::Stopped => {
                self.ctx.docker.start(PROXY_CONTAINER).await?;
                Ok(())
            }
            ContainerState::Absent => {
                let args = vec![
                    "--name".to_string(),
                    PROXY_CONTAINER.to_string(),
                    "--network".to_string(),
                    PROXY_NETWORK.to_string(),
                    "--restart".to_string(),
                    "unless-stopped".to_string(),
                    "-p".to_string(),
                    "80:80".to_string(),
                    "-p".to_string(),
                    "443:443".to_string(),
                    "--add-host".to_string(),
                    format!("{}:host-gateway", UPSTREAM_HOST),
                    "-v".to_string(),
                    format!("{}:/etc/nginx/conf.d", conf_dir.display()),
                    PROXY_IMAGE.to_string(),
                ];
                self.ctx.docker.run_detached(&args).await?;
                tracing::info!("started {}", PROXY_CONTAINER);
                Ok(())
            }
        }
    }

    /// Signal the proxy to re-read its routes.
    pub async fn reload(&self) -> Result<()> {
        let output = self
            .ctx
            .docker
            .exec(PROXY_CONTAINER, &["nginx", "-s", "reload"])
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::BackendDegraded {
                backend: "proxy".to_string(),
                detail: output.stderr.trim().to_string(),
            })
        }
    }

    async fn reload_as_warning(&self) -> Vec<Error> {
        match self.reload().await {
            Ok(()) => Vec::new(),
            Err(e) => {
                tracing::warn!("proxy reload failed, routes stay on disk: {}", e);
                vec![e]
            }
        }
    }
}

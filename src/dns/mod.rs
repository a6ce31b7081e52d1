//! DNS reconciliation.
//!
//! Two interchangeable backends keep project domains resolving: a dnsmasq
//! container (preferred) and a host-native dnsmasq (fallback). The backend is
//! probed once per process, cached on the injected context, and can be pinned
//! explicitly. Per-project state is one config fragment of
//! `address=/<domain>/<ip>` lines; everything else is driving the chosen
//! backend to re-read it.

pub mod container;
pub mod host;

use crate::context::NetContext;
use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Address project domains resolve to: the host loopback, where the proxy
/// listens.
pub const PROJECT_DNS_IP: &str = "127.0.0.1";

/// Host port the containerized resolver is published on (loopback only).
pub const CONTAINER_DNS_PORT: u16 = 53053;

/// Which system answers DNS queries for the chosen TLD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsBackend {
    /// dnsmasq in a container with a fixed name and static IP.
    Container,
    /// dnsmasq installed on the host, managed by the OS service manager.
    Host,
}

impl fmt::Display for DnsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsBackend::Container => write!(f, "containerized"),
            DnsBackend::Host => write!(f, "host-native"),
        }
    }
}

/// Render a per-project fragment: one address record per domain.
pub fn render_fragment(domains: &[String]) -> String {
    let mut out = String::new();
    for domain in domains {
        out.push_str(&format!("address=/{}/{}\n", domain, PROJECT_DNS_IP));
    }
    out
}

/// Keeps DNS records in sync with a project's derived names.
pub struct DnsReconciler<'a> {
    ctx: &'a NetContext,
}

impl<'a> DnsReconciler<'a> {
    pub fn new(ctx: &'a NetContext) -> Self {
        Self { ctx }
    }

    /// The active backend, probing once on first use.
    ///
    /// The probe asks a single question: is the container runtime available?
    /// If yes the containerized backend is selected, otherwise host-native.
    pub async fn backend(&self) -> DnsBackend {
        if let Some(backend) = self.ctx.dns_backend() {
            return backend;
        }
        let backend = if self.ctx.docker.daemon_healthy(Duration::from_secs(3)).await {
            DnsBackend::Container
        } else {
            DnsBackend::Host
        };
        tracing::info!("selected {} DNS backend", backend);
        self.ctx.set_dns_backend(backend);
        backend
    }

    /// Install address records for a project's domains and reconcile the
    /// backend.
    ///
    /// Containerized-backend failure falls back to the host backend for this
    /// call (logged as a warning) rather than failing provisioning. Returned
    /// errors are warning-level; fatal problems propagate as `Err`.
    pub async fn install(&self, project: &str, domains: &[String]) -> Result<Vec<Error>> {
        if domains.is_empty() {
            // No web-facing services: converge toward "no records installed".
            return self.remove(project).await;
        }

        let mut warnings = Vec::new();
        let backend = self.backend().await;

        let effective = match backend {
            DnsBackend::Container => {
                match container::install(self.ctx, project, domains).await {
                    Ok(mut w) => {
                        warnings.append(&mut w);
                        DnsBackend::Container
                    }
                    Err(e) => {
                        tracing::warn!(
                            "containerized DNS install failed ({}), falling back to host-native",
                            e
                        );
                        warnings.push(Error::BackendDegraded {
                            backend: "containerized DNS".to_string(),
                            detail: e.to_string(),
                        });
                        let mut w = host::install(self.ctx, project, domains).await?;
                        warnings.append(&mut w);
                        DnsBackend::Host
                    }
                }
            }
            DnsBackend::Host => {
                let mut w = host::install(self.ctx, project, domains).await?;
                warnings.append(&mut w);
                DnsBackend::Host
            }
        };

        self.ensure_resolver_stanza(effective).await?;

        // New names should resolve immediately; a stale negative cache entry
        // would make the freshly installed domain look broken.
        self.flush_resolver_cache().await;

        Ok(warnings)
    }

    /// Remove a project's records and reconcile, mirroring `install`.
    pub async fn remove(&self, project: &str) -> Result<Vec<Error>> {
        let mut warnings = Vec::new();
        match self.backend().await {
            DnsBackend::Container => {
                warnings.extend(container::remove(self.ctx, project).await?);
                // A fallback install may have written through the host
                // backend; clear that fragment too.
                if let Ok(mut extra) = host::remove(self.ctx, project).await {
                    warnings.append(&mut extra);
                }
            }
            DnsBackend::Host => {
                warnings.extend(host::remove(self.ctx, project).await?);
                crate::fsio::remove_if_exists(&self.container_fragment_path(project))?;
            }
        }
        self.flush_resolver_cache().await;
        Ok(warnings)
    }

    /// True when a fragment for the project is installed (either backend).
    pub fn fragment_installed(&self, project: &str) -> bool {
        if self.container_fragment_path(project).is_file() {
            return true;
        }
        self.ctx
            .dirs
            .host_dnsmasq_dirs
            .iter()
            .any(|dir| dir.join(format!("{}.conf", project)).is_file())
    }

    pub fn container_fragment_path(&self, project: &str) -> PathBuf {
        self.ctx
            .dirs
            .dns_conf_dir()
            .join(format!("{}.conf", project))
    }

    // ========================================================================
    // Resolver stanza
    // ========================================================================

    fn stanza_path(&self) -> PathBuf {
        self.ctx.dirs.resolver_dir.join(&self.ctx.tld)
    }

    fn expected_stanza(&self, backend: DnsBackend) -> String {
        match backend {
            DnsBackend::Container => {
                format!("nameserver {}\nport {}\n", PROJECT_DNS_IP, CONTAINER_DNS_PORT)
            }
            DnsBackend::Host => format!("nameserver {}\n", PROJECT_DNS_IP),
        }
    }

    /// Ensure the OS routes the TLD to our backend.
    ///
    /// The content-equality check is what makes re-runs idempotent: a correct
    /// stanza short-circuits before any privileged write is attempted, so the
    /// user is not re-prompted for sudo on every `berth up`.
    pub async fn ensure_resolver_stanza(&self, backend: DnsBackend) -> Result<()> {
        let path = self.stanza_path();
        let expected = self.expected_stanza(backend);

        if let Ok(existing) = std::fs::read_to_string(&path) {
            if existing == expected {
                return Ok(());
            }
        }

        // Try the unprivileged write first; resolver_dir is redirectable in
        // tests and may be user-writable on some setups.
        match crate::fsio::atomic_write(&path, &expected) {
            Ok(()) => {
                tracing::info!("installed resolver stanza {}", path.display());
                return Ok(());
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {}
            Err(e) => return Err(e),
        }

        let shell_cmd = format!(
            "mkdir -p {dir} && printf '{content}' > {file}",
            dir = self.ctx.dirs.resolver_dir.display(),
            content = expected.replace('\n', "\\n"),
            file = path.display(),
        );
        let output = self
            .ctx
            .runner
            .run("sudo", &["sh", "-c", shell_cmd.as_str()], Duration::from_secs(60))
            .await
            .map_err(crate::docker::DockerError::from)?;

        if output.success() {
            tracing::info!("installed resolver stanza {} (elevated)", path.display());
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                path: path.display().to_string(),
                remediation: format!("sudo sh -c \"{}\"", shell_cmd),
            })
        }
    }

    /// Flush the local resolver cache. Best-effort: every failure is
    /// swallowed, a stale cache only delays convergence.
    async fn flush_resolver_cache(&self) {
        let attempts: [(&str, &[&str]); 3] = [
            ("dscacheutil", &["-flushcache"]),
            ("killall", &["-HUP", "mDNSResponder"]),
            ("resolvectl", &["flush-caches"]),
        ];
        for (program, args) in attempts {
            if let Ok(output) = self
                .ctx
                .runner
                .run(program, args, Duration::from_secs(10))
                .await
            {
                if output.success() {
                    tracing::debug!("flushed resolver cache via {}", program);
                    return;
                }
            }
        }
        tracing::debug!("resolver cache flush unavailable on this host");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StateDirs;
    use crate::runner::ScriptedRunner;
    use std::sync::Arc;

    fn ctx_at(root: &std::path::Path, runner: Arc<ScriptedRunner>) -> NetContext {
        let mut dirs = StateDirs::under(root.to_path_buf());
        dirs.resolver_dir = root.join("resolver");
        dirs.host_dnsmasq_dirs = vec![root.join("dnsmasq.d")];
        NetContext::at(dirs, "test", runner)
    }

    #[test]
    fn fragment_renders_one_line_per_domain() {
        let fragment = render_fragment(&["shop.test".into(), "api.shop.test".into()]);
        assert_eq!(
            fragment,
            "address=/shop.test/127.0.0.1\naddress=/api.shop.test/127.0.0.1\n"
        );
    }

    #[tokio::test]
    async fn probe_prefers_container_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        // scripted default: `docker info` succeeds
        let ctx = ctx_at(dir.path(), runner);
        let reconciler = DnsReconciler::new(&ctx);
        assert_eq!(reconciler.backend().await, DnsBackend::Container);
        // cached on the context afterwards
        assert_eq!(ctx.dns_backend(), Some(DnsBackend::Container));
    }

    #[tokio::test]
    async fn probe_falls_back_to_host_without_docker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("info", "Cannot connect to the Docker daemon");
        let ctx = ctx_at(dir.path(), runner);
        assert_eq!(DnsReconciler::new(&ctx).backend().await, DnsBackend::Host);
    }

    #[tokio::test]
    async fn pinned_backend_skips_probe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ctx_at(dir.path(), runner.clone()).with_dns_backend(DnsBackend::Host);
        assert_eq!(DnsReconciler::new(&ctx).backend().await, DnsBackend::Host);
        assert!(!runner.saw("info"));
    }

    #[tokio::test]
    async fn stanza_written_once_and_skipped_when_correct() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ctx_at(dir.path(), runner.clone());
        let reconciler = DnsReconciler::new(&ctx);

        reconciler
            .ensure_resolver_stanza(DnsBackend::Container)
            .await
            .expect("first write");
        let path = ctx.dirs.resolver_dir.join("test");
        let written = std::fs::read_to_string(&path).expect("stanza");
        assert_eq!(written, "nameserver 127.0.0.1\nport 53053\n");

        // Second run must not shell out to sudo.
        reconciler
            .ensure_resolver_stanza(DnsBackend::Container)
            .await
            .expect("second run");
        assert!(!runner.saw("sudo"));
    }

    #[tokio::test]
    async fn stanza_content_mismatch_rewrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ctx_at(dir.path(), runner);
        let reconciler = DnsReconciler::new(&ctx);

        std::fs::create_dir_all(&ctx.dirs.resolver_dir).expect("mkdir");
        let path = ctx.dirs.resolver_dir.join("test");
        std::fs::write(&path, "nameserver 10.0.0.1\n").expect("seed");

        reconciler
            .ensure_resolver_stanza(DnsBackend::Host)
            .await
            .expect("rewrite");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "nameserver 127.0.0.1\n"
        );
    }
}

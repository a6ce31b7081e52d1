//! Containerized DNS backend: dnsmasq with a fixed name and a static IP on
//! its own bridge network, published on the host loopback.

use super::render_fragment;
use crate::context::NetContext;
use crate::docker::ContainerState;
use crate::error::{Error, Result};
use crate::fsio::{atomic_write, remove_if_exists};
use crate::proxy::{ProxyReconciler, PROXY_CONTAINER};
use std::path::PathBuf;

pub const DNS_CONTAINER: &str = "berth-dns";
pub const DNS_IMAGE: &str = "andyshinn/dnsmasq:2.78";
pub const DNS_NETWORK: &str = "berth-dns";
pub const DNS_NETWORK_SUBNET: &str = "172.28.0.0/24";
/// Static address inside the dedicated network, so the container's identity
/// survives recreation.
pub const DNS_STATIC_IP: &str = "172.28.0.53";

fn fragment_path(ctx: &NetContext, project: &str) -> PathBuf {
    ctx.dirs.dns_conf_dir().join(format!("{}.conf", project))
}

/// Install a project's records: ensure the server, write the fragment, make
/// the running dnsmasq pick it up.
pub async fn install(ctx: &NetContext, project: &str, domains: &[String]) -> Result<Vec<Error>> {
    ensure_server(ctx).await?;

    atomic_write(&fragment_path(ctx, project), &render_fragment(domains))?;
    tracing::debug!(project, records = domains.len(), "installed DNS fragment");

    reconcile(ctx).await
}

/// Remove a project's records and reconcile, if there is anything to do.
pub async fn remove(ctx: &NetContext, project: &str) -> Result<Vec<Error>> {
    let removed = remove_if_exists(&fragment_path(ctx, project))?;
    if !removed {
        return Ok(Vec::new());
    }
    if !ctx.docker.is_running(DNS_CONTAINER).await {
        return Ok(Vec::new());
    }
    reconcile(ctx).await
}

/// Idempotent create/start of the DNS container and its network.
pub async fn ensure_server(ctx: &NetContext) -> Result<()> {
    ctx.docker
        .ensure_network(DNS_NETWORK, Some(DNS_NETWORK_SUBNET))
        .await?;

    let conf_dir = ctx.dirs.dns_conf_dir();
    std::fs::create_dir_all(&conf_dir)?;

    match ctx.docker.container_state(DNS_CONTAINER).await? {
        ContainerState::Running => return Ok(()),
        ContainerState::Stopped => ctx.docker.start(DNS_CONTAINER).await?,
        ContainerState::Absent => create_container(ctx).await?,
    }

    wait_ready(ctx).await
}

async fn create_container(ctx: &NetContext) -> Result<()> {
    let conf_dir = ctx.dirs.dns_conf_dir();
    let args = vec![
        "--name".to_string(),
        DNS_CONTAINER.to_string(),
        "--network".to_string(),
        DNS_NETWORK.to_string(),
        "--ip".to_string(),
        DNS_STATIC_IP.to_string(),
        "--restart".to_string(),
        "unless-stopped".to_string(),
        "--cap-add".to_string(),
        "NET_ADMIN".to_string(),
        "-p".to_string(),
        format!("127.0.0.1:{}:53/udp", super::CONTAINER_DNS_PORT),
        "-p".to_string(),
        format!("127.0.0.1:{}:53/tcp", super::CONTAINER_DNS_PORT),
        "-v".to_string(),
        format!("{}:/etc/dnsmasq.d", conf_dir.display()),
        DNS_IMAGE.to_string(),
        "--conf-dir=/etc/dnsmasq.d".to_string(),
    ];
    ctx.docker.run_detached(&args).await?;
    tracing::info!("started {}", DNS_CONTAINER);
    Ok(())
}

/// Poll until the container is up AND an actual lookup succeeds from inside
/// it. Exhausting the budget fails the provisioning attempt.
async fn wait_ready(ctx: &NetContext) -> Result<()> {
    let docker = &ctx.docker;
    let ready = ctx
        .retry
        .run("DNS container", || async move {
            if !docker.is_running(DNS_CONTAINER).await {
                return false;
            }
            match docker
                .exec(DNS_CONTAINER, &["nslookup", "localhost", "127.0.0.1"])
                .await
            {
                Ok(output) => output.success(),
                Err(_) => false,
            }
        })
        .await;

    if ready {
        Ok(())
    } else {
        Err(Error::ReconciliationTimeout {
            what: format!("DNS container {}", DNS_CONTAINER),
            attempts: ctx.retry.max_attempts,
        })
    }
}

/// Make the running backend pick up fragment changes.
///
/// Graceful first: signal dnsmasq (PID 1 in the container) to re-read its
/// config, then reload the paired proxy. A failed graceful path escalates to
/// a full restart when the context policy allows it, which guarantees the
/// configuration is picked up at the cost of a brief outage.
async fn reconcile(ctx: &NetContext) -> Result<Vec<Error>> {
    let mut warnings = Vec::new();

    let graceful_ok = match ctx.docker.exec(DNS_CONTAINER, &["kill", "-HUP", "1"]).await {
        Ok(output) if output.success() => true,
        Ok(output) => {
            tracing::warn!("dnsmasq SIGHUP failed: {}", output.stderr.trim());
            false
        }
        Err(e) => {
            tracing::warn!("dnsmasq SIGHUP failed: {}", e);
            false
        }
    };

    if graceful_ok {
        // The proxy serves the same domains; reload it so both views move
        // together. Warning-level, same as proxy installs.
        if ctx.docker.is_running(PROXY_CONTAINER).await {
            if let Err(e) = ProxyReconciler::new(ctx).reload().await {
                tracing::warn!("paired proxy reload failed: {}", e);
                warnings.push(e);
            }
        }
        return Ok(warnings);
    }

    if !ctx.restart_on_reload_failure {
        warnings.push(Error::BackendDegraded {
            backend: "dnsmasq".to_string(),
            detail: "graceful reload failed; restart disabled by policy, fragment stays on disk"
                .to_string(),
        });
        return Ok(warnings);
    }

    restart_server(ctx).await?;
    warnings.push(Error::BackendDegraded {
        backend: "dnsmasq".to_string(),
        detail: "graceful reload failed, recovered via full restart".to_string(),
    });
    Ok(warnings)
}

/// Full restart: stop, remove, recreate. The blunt instrument that always
/// picks up configuration.
async fn restart_server(ctx: &NetContext) -> Result<()> {
    ctx.docker.stop(DNS_CONTAINER).await?;
    ctx.docker.rm_force(DNS_CONTAINER).await?;
    create_container(ctx).await?;
    wait_ready(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StateDirs;
    use crate::retry::RetryPolicy;
    use crate::runner::{RunOutput, ScriptedRunner};
    use std::sync::Arc;

    fn ctx_at(root: &std::path::Path, runner: Arc<ScriptedRunner>) -> NetContext {
        let mut dirs = StateDirs::under(root.to_path_buf());
        dirs.resolver_dir = root.join("resolver");
        NetContext::at(dirs, "test", runner).with_retry(RetryPolicy::immediate(3))
    }

    fn domains() -> Vec<String> {
        vec!["shop.test".to_string(), "api.shop.test".to_string()]
    }

    #[tokio::test]
    async fn install_writes_fragment_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("inspect -f", RunOutput::ok("true\n"));
        let ctx = ctx_at(dir.path(), runner.clone());

        let warnings = install(&ctx, "shop", &domains()).await.expect("install");
        assert!(warnings.is_empty());

        let fragment =
            std::fs::read_to_string(ctx.dirs.dns_conf_dir().join("shop.conf")).expect("fragment");
        assert!(fragment.contains("address=/shop.test/127.0.0.1"));
        assert!(runner.saw("exec berth-dns kill -HUP 1"));
        assert!(runner.saw("exec berth-proxy nginx -s reload"));
    }

    #[tokio::test]
    async fn ensure_server_starts_stopped_container() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("network inspect", "no such network");
        runner.on("nslookup", RunOutput::ok("Address: 127.0.0.1"));
        // Stopped on the first inspect, running once started.
        runner.on_once("inspect -f", RunOutput::ok("false\n"));
        runner.on("inspect -f", RunOutput::ok("true\n"));
        let ctx = ctx_at(dir.path(), runner.clone());

        ensure_server(&ctx).await.expect("ensure");
        assert!(runner.saw("network create --subnet 172.28.0.0/24 berth-dns"));
        assert!(runner.saw("start berth-dns"));
    }

    #[tokio::test]
    async fn reload_failure_escalates_to_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("kill -HUP", "signal delivery failed");
        runner.on("nslookup", RunOutput::ok("Address: 127.0.0.1"));
        runner.on("inspect -f", RunOutput::ok("true\n"));
        let ctx = ctx_at(dir.path(), runner.clone());

        let warnings = install(&ctx, "shop", &domains()).await.expect("install");
        assert_eq!(warnings.len(), 1);
        assert!(!warnings[0].is_fatal());
        assert!(runner.saw("stop berth-dns"));
        assert!(runner.saw("rm -f berth-dns"));
        assert!(runner.saw("run -d --name berth-dns"));
    }

    #[tokio::test]
    async fn reload_failure_without_restart_policy_only_warns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("kill -HUP", "signal delivery failed");
        runner.on("inspect -f", RunOutput::ok("true\n"));
        let ctx = ctx_at(dir.path(), runner.clone()).with_restart_on_reload_failure(false);

        let warnings = install(&ctx, "shop", &domains()).await.expect("install");
        assert_eq!(warnings.len(), 1);
        assert!(!runner.saw("rm -f berth-dns"));
        // Fragment survives for the next reconciliation.
        assert!(ctx.dirs.dns_conf_dir().join("shop.conf").is_file());
    }

    #[tokio::test]
    async fn health_poll_budget_exhaustion_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        // Container claims absent, and stays down after create.
        runner.on("inspect -f", RunOutput::err(1, "No such container"));
        let ctx = ctx_at(dir.path(), runner.clone());

        let err = install(&ctx, "shop", &domains()).await.expect_err("timeout");
        assert!(matches!(err, Error::ReconciliationTimeout { .. }));
    }

    #[tokio::test]
    async fn remove_missing_fragment_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ctx_at(dir.path(), runner.clone());

        let warnings = remove(&ctx, "ghost").await.expect("remove");
        assert!(warnings.is_empty());
        assert!(!runner.saw("kill -HUP"));
    }
}

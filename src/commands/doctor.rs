use crate::context::NetContext;
use crate::dns::container::DNS_CONTAINER;
use crate::docker::ContainerState;
use crate::output::UserOutput;
use crate::proxy::PROXY_CONTAINER;
use std::time::Duration;

/// Diagnose the environment: every external collaborator this tool drives,
/// plus the state it owns.
pub async fn run_doctor(ctx: &NetContext, out: &dyn UserOutput) -> anyhow::Result<()> {
    out.status("Checking environment...\n");

    let mut all_ok = true;

    // Docker binary + daemon
    out.progress("Docker: ");
    match ctx.docker.version().await {
        Ok(version) => {
            out.finish_progress(&version);

            out.progress("Docker daemon: ");
            if ctx.docker.daemon_healthy(Duration::from_secs(5)).await {
                out.finish_progress("running");
            } else {
                out.finish_progress(
                    "not running (start Docker Desktop or run: sudo systemctl start docker)",
                );
                all_ok = false;
            }
        }
        Err(_) => {
            out.finish_progress("not found (https://docs.docker.com/get-docker/)");
            all_ok = false;
        }
    }

    // Compose
    out.progress("Compose: ");
    match ctx
        .runner
        .run("docker", &["compose", "version"], Duration::from_secs(5))
        .await
    {
        Ok(output) if output.success() => {
            out.finish_progress(output.stdout.trim());
        }
        _ => {
            out.finish_progress("not found (needed for status probes)");
            all_ok = false;
        }
    }

    // Host dnsmasq (only matters for the host-native backend)
    out.progress("Host dnsmasq config dir: ");
    match ctx.dirs.host_dnsmasq_dirs.iter().find(|d| d.is_dir()) {
        Some(dir) => out.finish_progress(&dir.display().to_string()),
        None => out.finish_progress("none (fine while the containerized backend is used)"),
    }

    // Resolver stanza
    let stanza = ctx.dirs.resolver_dir.join(&ctx.tld);
    out.progress(&format!("Resolver stanza ({}): ", stanza.display()));
    if stanza.is_file() {
        out.finish_progress("installed");
    } else {
        out.finish_progress("missing (installed on first `berth up`)");
    }

    // Managed containers
    for name in [PROXY_CONTAINER, DNS_CONTAINER] {
        out.progress(&format!("{}: ", name));
        match ctx.docker.container_state(name).await {
            Ok(ContainerState::Running) => out.finish_progress("running"),
            Ok(ContainerState::Stopped) => out.finish_progress("stopped (started on demand)"),
            Ok(ContainerState::Absent) => out.finish_progress("absent (created on demand)"),
            Err(_) => out.finish_progress("unknown (docker unavailable)"),
        }
    }

    // Ledger
    out.progress("Port ledger: ");
    let ledger = ctx.ledger();
    if ledger.path().is_file() {
        match ledger.projects() {
            Ok(projects) => {
                out.finish_progress(&format!("{} project(s) allocated", projects.len()))
            }
            Err(e) => {
                out.finish_progress(&format!("unreadable ({})", e));
                all_ok = false;
            }
        }
    } else {
        out.finish_progress("empty (created on first allocation)");
    }

    out.blank();
    if all_ok {
        out.success("Environment looks good");
    } else {
        out.error("Some requirements are missing; see above");
    }

    Ok(())
}

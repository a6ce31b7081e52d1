//! Host-native DNS backend: a dnsmasq managed by the OS service manager.
//!
//! The per-project fragment goes straight into the host dnsmasq's config
//! directory; picking it up means restarting the service, tried through the
//! common mechanisms in order until one works.

use super::render_fragment;
use crate::context::NetContext;
use crate::error::{Error, Result};
use crate::fsio::{atomic_write, remove_if_exists};
use std::path::PathBuf;
use std::time::Duration;

/// Restart mechanisms, most specific first. Homebrew's own service manager
/// does not want sudo; the system managers do.
const RESTART_LADDER: [(&str, &[&str]); 3] = [
    ("brew", &["services", "restart", "dnsmasq"]),
    ("sudo", &["systemctl", "restart", "dnsmasq"]),
    ("sudo", &["service", "dnsmasq", "restart"]),
];

/// The host dnsmasq config directory: first candidate that exists.
pub fn fragment_dir(ctx: &NetContext) -> Result<PathBuf> {
    ctx.dirs
        .host_dnsmasq_dirs
        .iter()
        .find(|dir| dir.is_dir())
        .cloned()
        .ok_or_else(|| Error::ToolUnavailable {
            tool: "dnsmasq".to_string(),
            detail: "no dnsmasq configuration directory found on this host".to_string(),
            hint: "Install dnsmasq first:\n\n    brew install dnsmasq    (macOS)\n    sudo apt install dnsmasq    (Debian/Ubuntu)"
                .to_string(),
        })
}

fn fragment_path(ctx: &NetContext, project: &str) -> Result<PathBuf> {
    Ok(fragment_dir(ctx)?.join(format!("{}.conf", project)))
}

/// Write the project's fragment and restart the host dnsmasq.
pub async fn install(ctx: &NetContext, project: &str, domains: &[String]) -> Result<Vec<Error>> {
    let path = fragment_path(ctx, project)?;
    atomic_write(&path, &render_fragment(domains))?;
    tracing::debug!(project, records = domains.len(), "installed host DNS fragment");
    Ok(restart(ctx).await)
}

/// Delete the project's fragment and restart, if the fragment existed.
pub async fn remove(ctx: &NetContext, project: &str) -> Result<Vec<Error>> {
    let Ok(path) = fragment_path(ctx, project) else {
        // No dnsmasq dir means nothing was ever installed here.
        return Ok(Vec::new());
    };
    if !remove_if_exists(&path)? {
        return Ok(Vec::new());
    }
    Ok(restart(ctx).await)
}

/// Best-effort restart through the ladder. Total failure degrades rather
/// than aborts: the fragment is on disk and the next successful restart
/// serves it.
async fn restart(ctx: &NetContext) -> Vec<Error> {
    for (program, args) in RESTART_LADDER {
        match ctx.runner.run(program, args, Duration::from_secs(60)).await {
            Ok(output) if output.success() => {
                tracing::debug!("restarted host dnsmasq via {}", program);
                return Vec::new();
            }
            Ok(output) => {
                tracing::debug!(
                    "dnsmasq restart via {} failed: {}",
                    program,
                    output.stderr.trim()
                );
            }
            Err(e) => {
                tracing::debug!("dnsmasq restart via {} failed: {}", program, e);
            }
        }
    }
    tracing::warn!("could not restart host dnsmasq through any mechanism");
    vec![Error::BackendDegraded {
        backend: "host dnsmasq".to_string(),
        detail: "no restart mechanism succeeded; records apply after the next restart".to_string(),
    }]
}

use crate::config::ProjectConfig;
use crate::context::NetContext;
use crate::dns::DnsReconciler;
use crate::error::Result;
use crate::health::HealthAggregator;
use crate::identity;
use crate::output::UserOutput;
use crate::proxy::{self, ProxyReconciler};

/// Bring a project online: allocate ports, derive names, install proxy
/// routes and DNS records, then probe what came up.
///
/// Port allocation persists before either reconciler reads it; DNS and proxy
/// installs tolerate each other being briefly out of step.
pub async fn run_up(
    ctx: &NetContext,
    config: &ProjectConfig,
    verify: bool,
    out: &dyn UserOutput,
) -> Result<()> {
    let project = &config.project;
    let specs = config.service_specs();

    out.status(&format!("Bringing '{}' online...", project));

    out.progress("  ports      ");
    let allocation = ctx.ledger().allocate(project, &specs)?;
    let mapped: usize = allocation.values().map(|ports| ports.len()).sum();
    out.finish_progress(&format!("{} host port(s) mapped", mapped));

    let identity = identity::derive(project, &specs, &ctx.tld);

    out.progress("  proxy      ");
    let mappings = proxy::build_mappings(&identity, &specs, &allocation);
    let proxy_warnings = ProxyReconciler::new(ctx).install(project, &mappings).await?;
    out.finish_progress(&format!("{} route(s) installed", mappings.len()));
    for warning in &proxy_warnings {
        out.warning(&format!("  warning: {}", warning));
    }

    out.progress("  dns        ");
    let domains = identity.domains();
    let dns = DnsReconciler::new(ctx);
    let dns_warnings = dns.install(project, &domains).await?;
    out.finish_progress(&format!(
        "{} record(s) via {} backend",
        domains.len(),
        dns.backend().await
    ));
    for warning in &dns_warnings {
        out.warning(&format!("  warning: {}", warning));
    }

    let aggregator = HealthAggregator::new(ctx);
    let mut status = aggregator.probe(project, &specs, &identity).await;
    if verify {
        aggregator.verify_urls(&mut status).await;
    }

    out.blank();
    out.success(&format!("'{}' is {}", project, status.overall));
    for service in &status.services {
        if let Some(url) = &service.url {
            let note = match service.reachable {
                Some(true) => "",
                Some(false) => "  (not answering yet)",
                None => "",
            };
            out.status(&format!("  {:<12} {}{}", service.name, url, note));
        }
    }

    Ok(())
}

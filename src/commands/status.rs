use crate::config::ProjectConfig;
use crate::context::NetContext;
use crate::error::Result;
use crate::gitinfo;
use crate::health::HealthAggregator;
use crate::identity;
use crate::output::UserOutput;
use std::path::Path;

/// Show the derived status of a project.
pub async fn run_status(
    ctx: &NetContext,
    config: &ProjectConfig,
    work_dir: &Path,
    json: bool,
    out: &dyn UserOutput,
) -> Result<()> {
    let specs = config.service_specs();
    let identity = identity::derive(&config.project, &specs, &ctx.tld);

    let aggregator = HealthAggregator::new(ctx);
    let status = aggregator.probe(&config.project, &specs, &identity).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    // Git context is decoration only; any failure just drops the line.
    let git_line = gitinfo::summarize(work_dir)
        .map(|summary| format!("  {}", summary.one_line()))
        .unwrap_or_default();

    out.status(&format!(
        "{} [{}]{}",
        config.project, status.overall, git_line
    ));
    out.blank();

    if status.services.is_empty() {
        out.status("  (no services)");
        return Ok(());
    }

    for service in &status.services {
        let state = match service.state {
            crate::health::ServiceState::Running => "running",
            crate::health::ServiceState::Stopped => "stopped",
            crate::health::ServiceState::Unhealthy => "unhealthy",
        };
        let url = service.url.as_deref().unwrap_or("-");
        out.status(&format!("  {:<14} {:<10} {}", service.name, state, url));
    }

    Ok(())
}

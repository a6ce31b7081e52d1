//! Status aggregation totality: every combination of running/total maps to
//! exactly one overall status, including the degenerate inputs.

use berth::context::{NetContext, StateDirs};
use berth::health::{fold_overall, HealthAggregator, OverallStatus};
use berth::identity::{derive, ServiceSpec};
use berth::runner::{RunOutput, ScriptedRunner};
use std::sync::Arc;
use tempfile::TempDir;

fn ctx_with(runner: Arc<ScriptedRunner>) -> (TempDir, NetContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut dirs = StateDirs::under(dir.path().to_path_buf());
    dirs.resolver_dir = dir.path().join("resolver");
    dirs.host_dnsmasq_dirs = vec![dir.path().join("dnsmasq.d")];
    (dir, NetContext::at(dirs, "test", runner))
}

fn record_line(service: &str, state: &str) -> String {
    format!(
        "{{\"Service\":\"{}\",\"State\":\"{}\",\"Health\":\"\",\"Publishers\":[]}}",
        service, state
    )
}

#[test]
fn fold_matches_the_specified_mapping() {
    // 0 total -> no-services; running == total > 0 -> running;
    // 0 < running < total -> partial; running == 0 < total -> stopped.
    assert_eq!(fold_overall(0, 0), OverallStatus::NoServices);
    for total in 1..=3usize {
        for running in 0..=total {
            let expected = if running == total {
                OverallStatus::Running
            } else if running > 0 {
                OverallStatus::Partial
            } else {
                OverallStatus::Stopped
            };
            assert_eq!(fold_overall(running, total), expected);
        }
    }
}

#[tokio::test]
async fn probe_grid_yields_exactly_one_status() {
    for total in 0..=3usize {
        for running in 0..=total.min(2) {
            let runner = Arc::new(ScriptedRunner::new());

            let mut lines = Vec::new();
            for index in 0..total {
                let state = if index < running { "running" } else { "exited" };
                lines.push(record_line(&format!("svc{}", index), state));
            }
            runner.on("compose -p grid ps", RunOutput::ok(lines.join("\n")));

            let (_dir, ctx) = ctx_with(runner);
            let specs: Vec<ServiceSpec> = (0..total)
                .map(|index| ServiceSpec::new(format!("svc{}", index), vec![]))
                .collect();
            let identity = derive("grid", &specs, "test");

            let status = HealthAggregator::new(&ctx)
                .probe("grid", &specs, &identity)
                .await;

            let expected = match (running, total) {
                (_, 0) => OverallStatus::NoServices,
                (r, t) if r == t => OverallStatus::Running,
                (0, _) => OverallStatus::Stopped,
                _ => OverallStatus::Partial,
            };
            assert_eq!(
                status.overall, expected,
                "running={} total={}",
                running, total
            );
        }
    }
}

#[tokio::test]
async fn degenerate_inputs_have_their_own_statuses() {
    // Runtime missing entirely.
    let runner = Arc::new(ScriptedRunner::new());
    runner.fail("info", "Cannot connect to the Docker daemon");
    let (_dir, ctx) = ctx_with(runner);
    let identity = derive("p", &[], "test");
    let status = HealthAggregator::new(&ctx).probe("p", &[], &identity).await;
    assert_eq!(status.overall, OverallStatus::NoDocker);

    // Runtime present but the state query fails.
    let runner = Arc::new(ScriptedRunner::new());
    runner.fail("compose -p p ps", "boom");
    let (_dir, ctx) = ctx_with(runner);
    let status = HealthAggregator::new(&ctx).probe("p", &[], &identity).await;
    assert_eq!(status.overall, OverallStatus::DockerError);
}

#[tokio::test]
async fn unhealthy_services_prevent_running_status() {
    let runner = Arc::new(ScriptedRunner::new());
    let lines = format!(
        "{}\n{{\"Service\":\"api\",\"State\":\"running\",\"Health\":\"unhealthy\",\"Publishers\":[]}}",
        record_line("web", "running")
    );
    runner.on("compose -p mixed ps", RunOutput::ok(lines));
    let (_dir, ctx) = ctx_with(runner);

    let specs = vec![
        ServiceSpec::new("web", vec![80]),
        ServiceSpec::new("api", vec![8080]),
    ];
    let identity = derive("mixed", &specs, "test");
    let status = HealthAggregator::new(&ctx)
        .probe("mixed", &specs, &identity)
        .await;
    assert_eq!(status.overall, OverallStatus::Partial);
}

//! Backend fallback: when the containerized DNS install fails, the same call
//! must succeed through the host-native backend and the project's records
//! must land in the installed fragment.

use berth::context::{NetContext, StateDirs};
use berth::dns::{DnsBackend, DnsReconciler};
use berth::retry::RetryPolicy;
use berth::runner::ScriptedRunner;
use std::sync::Arc;
use tempfile::TempDir;

fn ctx_with(runner: Arc<ScriptedRunner>) -> (TempDir, NetContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let dnsmasq_dir = dir.path().join("dnsmasq.d");
    std::fs::create_dir_all(&dnsmasq_dir).expect("mkdir");

    let mut dirs = StateDirs::under(dir.path().to_path_buf());
    dirs.resolver_dir = dir.path().join("resolver");
    dirs.host_dnsmasq_dirs = vec![dnsmasq_dir];
    (
        dir,
        NetContext::at(dirs, "test", runner).with_retry(RetryPolicy::immediate(2)),
    )
}

fn domains() -> Vec<String> {
    vec!["blog.test".to_string(), "api.blog.test".to_string()]
}

#[tokio::test]
async fn container_failure_falls_back_to_host_backend() {
    let runner = Arc::new(ScriptedRunner::new());
    // The container backend cannot even get its network up.
    runner.fail("network inspect", "no such network");
    runner.fail("network create", "permission denied on docker socket");
    let (dir, ctx) = ctx_with(runner.clone());

    let reconciler = DnsReconciler::new(&ctx);
    assert_eq!(reconciler.backend().await, DnsBackend::Container);

    let warnings = reconciler
        .install("blog", &domains())
        .await
        .expect("install succeeds via fallback");

    // The failed container attempt is surfaced as a warning, not an error.
    assert!(
        warnings.iter().any(|w| !w.is_fatal()),
        "expected a degraded-backend warning, got {:?}",
        warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>()
    );

    // The fragment landed in the host dnsmasq directory with one address
    // record per domain.
    let fragment = std::fs::read_to_string(dir.path().join("dnsmasq.d/blog.conf"))
        .expect("host fragment installed");
    assert!(fragment.contains("address=/blog.test/127.0.0.1"));
    assert!(fragment.contains("address=/api.blog.test/127.0.0.1"));

    // The host restart ladder ran.
    assert!(runner.saw("brew services restart dnsmasq") || runner.saw("systemctl"));

    // The fallback was per-call: the cached choice stays containerized.
    assert_eq!(ctx.dns_backend(), Some(DnsBackend::Container));
}

#[tokio::test]
async fn host_backend_serves_when_probe_finds_no_docker() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.fail("info", "Cannot connect to the Docker daemon");
    let (dir, ctx) = ctx_with(runner.clone());

    let reconciler = DnsReconciler::new(&ctx);
    let warnings = reconciler.install("blog", &domains()).await.expect("install");
    assert!(warnings.is_empty());
    assert_eq!(ctx.dns_backend(), Some(DnsBackend::Host));

    assert!(dir.path().join("dnsmasq.d/blog.conf").is_file());
    // No container work was attempted.
    assert!(!runner.saw("run -d --name berth-dns"));
}

#[tokio::test]
async fn remove_clears_host_fragment() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.fail("info", "no docker");
    let (dir, ctx) = ctx_with(runner);

    let reconciler = DnsReconciler::new(&ctx);
    reconciler.install("blog", &domains()).await.expect("install");
    assert!(reconciler.fragment_installed("blog"));

    reconciler.remove("blog").await.expect("remove");
    assert!(!dir.path().join("dnsmasq.d/blog.conf").exists());
    assert!(!reconciler.fragment_installed("blog"));
}

#[tokio::test]
async fn resolver_stanza_matches_the_backend_in_use() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.fail("info", "no docker");
    let (_dir, ctx) = ctx_with(runner);

    let reconciler = DnsReconciler::new(&ctx);
    reconciler.install("blog", &domains()).await.expect("install");

    let stanza = std::fs::read_to_string(ctx.dirs.resolver_dir.join("test")).expect("stanza");
    // Host backend listens on the standard port: no port line.
    assert_eq!(stanza, "nameserver 127.0.0.1\n");
}

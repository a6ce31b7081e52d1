//! Per-run context threaded through the reconcilers.
//!
//! Everything that would otherwise be process-global (state directories, the
//! probed DNS backend, the retry policy, the subprocess runner) lives on one
//! struct constructed in `main` and passed by reference. Tests build their
//! own context against a temp directory and a scripted runner.

use crate::dns::DnsBackend;
use crate::docker::DockerClient;
use crate::ledger::PortLedger;
use crate::retry::RetryPolicy;
use crate::runner::{ProcessRunner, SystemRunner};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Filesystem layout of everything the core owns or touches.
#[derive(Debug, Clone)]
pub struct StateDirs {
    /// State root, normally `~/.berth`.
    pub root: PathBuf,
    /// OS resolver directory, normally `/etc/resolver` (elevated writes).
    pub resolver_dir: PathBuf,
    /// Candidate host dnsmasq config directories, probed in order.
    pub host_dnsmasq_dirs: Vec<PathBuf>,
}

impl StateDirs {
    pub fn under(root: PathBuf) -> Self {
        Self {
            root,
            resolver_dir: PathBuf::from("/etc/resolver"),
            host_dnsmasq_dirs: vec![
                PathBuf::from("/opt/homebrew/etc/dnsmasq.d"),
                PathBuf::from("/usr/local/etc/dnsmasq.d"),
                PathBuf::from("/etc/dnsmasq.d"),
            ],
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("ledger.json")
    }

    /// Installed proxy routes, one file per project.
    pub fn proxy_conf_dir(&self) -> PathBuf {
        self.root.join("proxy").join("conf.d")
    }

    /// Installed DNS fragments, one file per project.
    pub fn dns_conf_dir(&self) -> PathBuf {
        self.root.join("dns").join("conf.d")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join("certs")
    }
}

/// Injected context: constructed once per process run, never global.
pub struct NetContext {
    pub dirs: StateDirs,
    pub tld: String,
    pub runner: Arc<dyn ProcessRunner>,
    pub docker: DockerClient,
    pub retry: RetryPolicy,
    /// Whether a failed graceful reload escalates to a full backend restart.
    pub restart_on_reload_failure: bool,
    dns_backend: RwLock<Option<DnsBackend>>,
}

impl NetContext {
    /// Production context rooted at `~/.berth` with the system runner.
    pub fn new(tld: impl Into<String>) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        Ok(Self::at(
            StateDirs::under(home.join(".berth")),
            tld,
            Arc::new(SystemRunner),
        ))
    }

    /// Context with explicit dirs and runner (tests use a temp root and a
    /// scripted runner).
    pub fn at(dirs: StateDirs, tld: impl Into<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        let docker = DockerClient::new(runner.clone());
        Self {
            dirs,
            tld: tld.into(),
            runner,
            docker,
            retry: RetryPolicy::default(),
            restart_on_reload_failure: true,
            dns_backend: RwLock::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_restart_on_reload_failure(mut self, restart: bool) -> Self {
        self.restart_on_reload_failure = restart;
        self
    }

    /// Pin the DNS backend, bypassing the probe (operator override).
    pub fn with_dns_backend(self, backend: DnsBackend) -> Self {
        *self.dns_backend.write() = Some(backend);
        self
    }

    pub fn ledger(&self) -> PortLedger {
        PortLedger::new(self.dirs.ledger_path())
    }

    /// The cached backend choice, if probed or pinned already.
    pub fn dns_backend(&self) -> Option<DnsBackend> {
        *self.dns_backend.read()
    }

    pub fn set_dns_backend(&self, backend: DnsBackend) {
        *self.dns_backend.write() = Some(backend);
    }
}

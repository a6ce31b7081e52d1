use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Network identity for containerized local-dev projects: ports, DNS names and proxy routes")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to berth.yaml, searched upward)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Working directory to search for berth.yaml
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Top-level domain for project names (overrides the config)
    #[arg(long)]
    pub tld: Option<String>,

    /// Pin the DNS backend instead of probing for one
    #[arg(long, value_enum)]
    pub dns: Option<DnsBackendArg>,

    /// Never escalate a failed graceful reload to a full DNS restart
    #[arg(long)]
    pub no_restart_on_reload_failure: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DnsBackendArg {
    /// dnsmasq in a container (default when Docker is available)
    Container,
    /// dnsmasq on the host, managed by the OS service manager
    Host,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Allocate ports, derive names and install DNS + proxy routes
    Up {
        /// Skip the reachability verification of generated URLs
        #[arg(long)]
        no_verify: bool,
    },
    /// Remove DNS records and proxy routes, then release the ports
    Down {
        /// Project to tear down (defaults to the config's project)
        project: Option<String>,
    },
    /// Show the project's derived status and reachable URLs
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the environment: docker, compose, dnsmasq, resolver, containers
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

use berth::cli::{Cli, Commands, DnsBackendArg};
use berth::context::NetContext;
use berth::dns::DnsBackend;
use berth::{commands, config, output};
use clap::{CommandFactory, Parser};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<berth::Error>() {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Completions need no context at all.
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    init_tracing();

    let work_dir = match cli.workdir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    // ── Tier 1: commands that work without a config ─────────────────────
    match &cli.command {
        Commands::Doctor => {
            let ctx = build_context(&cli, default_tld(&cli, &work_dir))?;
            return commands::run_doctor(&ctx, &output::CliOutput).await;
        }
        Commands::Down {
            project: Some(project),
        } => {
            // Tearing down by name must work even after the config is gone.
            let ctx = build_context(&cli, default_tld(&cli, &work_dir))?;
            commands::run_down(&ctx, project, &output::CliOutput).await?;
            return Ok(());
        }
        _ => {}
    }

    // ── Tier 2: config-backed commands ──────────────────────────────────
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config::find_config_file(&work_dir)?,
    };
    let project_config = config::load_config(&config_path)?;
    let tld = cli
        .tld
        .clone()
        .unwrap_or_else(|| project_config.tld().to_string());
    let ctx = build_context(&cli, tld)?;

    match cli.command {
        Commands::Up { no_verify } => {
            commands::run_up(&ctx, &project_config, !no_verify, &output::CliOutput).await?;
        }
        Commands::Down { project } => {
            let project = project.unwrap_or_else(|| project_config.project.clone());
            commands::run_down(&ctx, &project, &output::CliOutput).await?;
        }
        Commands::Status { json } => {
            commands::run_status(&ctx, &project_config, &work_dir, json, &output::CliOutput)
                .await?;
        }
        // Handled in earlier tiers
        Commands::Doctor | Commands::Completions { .. } => {
            unreachable!("handled in earlier dispatch tiers");
        }
    }

    Ok(())
}

/// TLD for commands that may run without a config: the flag wins, then a
/// discoverable config's setting, then the default.
fn default_tld(cli: &Cli, work_dir: &std::path::Path) -> String {
    if let Some(tld) = &cli.tld {
        return tld.clone();
    }
    config::find_config_file(work_dir)
        .ok()
        .and_then(|path| config::load_config(&path).ok())
        .map(|c| c.tld().to_string())
        .unwrap_or_else(|| "test".to_string())
}

fn build_context(cli: &Cli, tld: String) -> berth::Result<NetContext> {
    let mut ctx = NetContext::new(tld)?;
    if cli.no_restart_on_reload_failure {
        ctx = ctx.with_restart_on_reload_failure(false);
    }
    if let Some(backend) = cli.dns {
        ctx = ctx.with_dns_backend(match backend {
            DnsBackendArg::Container => DnsBackend::Container,
            DnsBackendArg::Host => DnsBackend::Host,
        });
    }
    Ok(ctx)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

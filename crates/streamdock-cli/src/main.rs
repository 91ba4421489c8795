//! Command-line interface for StreamDock.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use streamdock_core::config::env_vars;
use streamdock_core::{Conversion, Host, HostConfig, LoadStatus, UninstallOutcome};

/// StreamDock - manage and query provider extensions.
#[derive(Parser, Debug)]
#[command(name = "streamdock")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to <data dir>/streamdock.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory override.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Repository subscriptions.
    Repo {
        #[command(subcommand)]
        repo_cmd: RepoCommand,
    },
    /// List the plugins offered by subscribed repositories.
    Plugins {
        /// Only this repository (URL or shortcode).
        repository: Option<String>,
    },
    /// Install a plugin from a subscribed repository.
    Install {
        /// Internal name of the plugin.
        name: String,
        /// Repository to take it from; every repository is searched otherwise.
        #[arg(short, long)]
        repository: Option<String>,
    },
    /// Download an artifact from a URL.
    Download {
        url: String,
        /// Name to store the artifact under.
        #[arg(short, long)]
        name: String,
    },
    /// List installed extensions and their load status.
    List,
    /// Search every loaded provider.
    Search {
        query: String,
    },
    /// Uninstall an extension by provider name, artifact name or path.
    Uninstall {
        name: String,
    },
    /// Retry deleting artifacts that could not be removed earlier.
    Sweep,
}

/// Repository subcommands.
#[derive(Subcommand, Debug)]
enum RepoCommand {
    /// Subscribe to a repository by URL or shortcode.
    Add { reference: String },
    /// Unsubscribe from a repository.
    Remove { reference: String },
    /// List subscribed repositories.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = HostConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config = HostConfig {
            user_agent: config.user_agent,
            connect_timeout_secs: config.connect_timeout_secs,
            temp_dir: config.temp_dir,
            ..HostConfig::with_data_dir(dir)
        };
    }

    let host = Host::init(config).await.context("Failed to start host")?;
    let result = run(&host, args.command).await;
    host.shutdown().await?;
    result
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "streamdock=debug"
    } else {
        "streamdock=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

async fn run(host: &Host, command: Command) -> Result<()> {
    match command {
        Command::Repo { repo_cmd } => run_repo_cmd(host, repo_cmd).await,
        Command::Plugins { repository } => list_plugins(host, repository).await,
        Command::Install { name, repository } => install(host, &name, repository).await,
        Command::Download { url, name } => download(host, &url, &name).await,
        Command::List => list_extensions(host).await,
        Command::Search { query } => search(host, &query).await,
        Command::Uninstall { name } => uninstall(host, &name).await,
        Command::Sweep => {
            let remaining = host.sweep().await?;
            println!("{} artifact(s) still pending deletion", remaining);
            Ok(())
        }
    }
}

async fn run_repo_cmd(host: &Host, cmd: RepoCommand) -> Result<()> {
    let repositories = host.repositories();
    match cmd {
        RepoCommand::Add { reference } => {
            let repository = repositories.add(&reference).await?;
            println!("Subscribed to {} ({})", repository.name, repository.url);
        }
        RepoCommand::Remove { reference } => {
            if repositories.remove(&reference).await? {
                println!("Unsubscribed from {}", reference);
            } else {
                println!("Not subscribed: {}", reference);
            }
        }
        RepoCommand::List => {
            let resolved = repositories.list();
            for url in repositories.subscriptions() {
                match resolved.iter().find(|r| r.url == url) {
                    Some(repository) => println!("{:<32} {}", repository.name, url),
                    None => println!("{:<32} {}", "(unreachable)", url),
                }
            }
        }
    }
    Ok(())
}

async fn list_plugins(host: &Host, repository: Option<String>) -> Result<()> {
    let repositories = match repository {
        Some(reference) => vec![host
            .repositories()
            .get(&reference)
            .with_context(|| format!("Not subscribed: {}", reference))?],
        None => host.repositories().list(),
    };

    for repository in repositories {
        println!("{}", repository.name);
        match host.repositories().client().fetch_plugin_list(&repository).await {
            Ok(plugins) => {
                for plugin in plugins {
                    println!(
                        "  {:<32} v{:<4} {}",
                        plugin.internal_name, plugin.version, plugin.url
                    );
                }
            }
            Err(e) => println!("  failed: {}", e),
        }
    }
    Ok(())
}

async fn install(host: &Host, name: &str, repository: Option<String>) -> Result<()> {
    let candidates = match repository {
        Some(reference) => vec![host
            .repositories()
            .get(&reference)
            .with_context(|| format!("Not subscribed: {}", reference))?],
        None => host.repositories().list(),
    };

    for repository in candidates {
        let plugins = match host.repositories().client().fetch_plugin_list(&repository).await {
            Ok(plugins) => plugins,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", repository.name, e);
                continue;
            }
        };
        if let Some(entry) = plugins.iter().find(|p| p.internal_name == name) {
            let downloaded = host.install(entry).await?;
            report_download(&downloaded);
            return Ok(());
        }
    }

    anyhow::bail!("Plugin {} not found in subscribed repositories", name)
}

async fn download(host: &Host, url: &str, name: &str) -> Result<()> {
    let downloaded = host.downloader().download(url, name).await?;
    host.reload().await?;
    report_download(&downloaded);
    Ok(())
}

fn report_download(downloaded: &streamdock_core::Downloaded) {
    let how = match &downloaded.conversion {
        Conversion::NotNeeded => "package".to_string(),
        Conversion::AlreadyArchive => "legacy module, already packaged".to_string(),
        Conversion::Transcoded => "legacy module, converted".to_string(),
        Conversion::Fallback(e) => format!("legacy module, stored unconverted: {}", e),
    };
    println!(
        "Installed {} ({})\n  sha256 {}",
        downloaded.artifact.path().display(),
        how,
        downloaded.sha256
    );
}

async fn list_extensions(host: &Host) -> Result<()> {
    let loaded = host.loader().list().await;
    if loaded.is_empty() {
        println!("No extensions installed in {}", host.store().dir().display());
        return Ok(());
    }

    for provider in loaded {
        let status = match &provider.status {
            LoadStatus::Loaded => "loaded".to_string(),
            LoadStatus::NoProvider => "no provider".to_string(),
            LoadStatus::Failed(e) => format!("failed: {}", e),
        };
        println!(
            "{:<24} {:<10} {:<20} {}",
            provider.name,
            provider.version.to_string(),
            provider.artifact.name(),
            status
        );
    }
    Ok(())
}

async fn search(host: &Host, query: &str) -> Result<()> {
    let results = host.loader().search(query).await;
    if results.is_empty() {
        println!("No results for {:?}", query);
    }
    for result in results {
        println!("{:<40} {:?}\t{}", result.name, result.kind, result.url);
    }
    Ok(())
}

async fn uninstall(host: &Host, name: &str) -> Result<()> {
    match host.loader().uninstall(name).await? {
        UninstallOutcome::Deleted => println!("Uninstalled {}", name),
        UninstallOutcome::PendingDeletion => {
            println!("Uninstalled {}; the file will be removed on the next sweep", name)
        }
    }
    Ok(())
}

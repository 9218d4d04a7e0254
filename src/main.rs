// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use cptmatch::appstream::ComponentListSource;
use cptmatch::config::Config;
use cptmatch::distro::{DistroContext, DistroRetriever, build_retrievers};
use cptmatch::pipeline::{Pipeline, RunOptions};
use cptmatch::repository::{HttpClient, Resource, probe_format};
use cptmatch::sink::JsonLinesSink;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cptmatch")]
#[command(author, version, about = "Track AppStream component versions across Linux distributions", long_about = None)]
struct Cli {
    /// Distribution registry (default: /etc/cptmatch/distributions.toml)
    #[arg(short, long, global = true, default_value = "/etc/cptmatch/distributions.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh repository caches of all distributions
    Update {
        /// Refresh even if caches haven't expired
        #[arg(short, long)]
        force: bool,
    },
    /// Match AppStream components against cached packages
    Ingest {
        /// Refresh caches first
        #[arg(short, long)]
        refresh: bool,
        /// Refresh even if caches haven't expired (implies --refresh)
        #[arg(short, long)]
        force: bool,
        /// Write JSON lines here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List configured releases
    Releases,
    /// Detect the metadata format of a repository
    Probe {
        /// Local path or HTTP(S) URL of the repository root
        resource: String,
    },
    /// Show a package's version in every release
    Packages {
        /// Package name
        name: String,
        /// Only this distribution
        #[arg(short, long)]
        distro: Option<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn load_config(path: &Path) -> Result<Arc<Config>> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    Ok(Arc::new(config))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    cptmatch::init_once();

    match cli.command {
        Some(Commands::Update { force }) => {
            let config = load_config(&cli.config)?;
            let pipeline = Pipeline::new(config, Box::new(ComponentListSource))?;
            let failures = pipeline.update(force);
            for failure in &failures {
                eprintln!("{} {}: {}", failure.distro, failure.release, failure.error);
            }
            if !failures.is_empty() {
                return Err(anyhow::anyhow!("{} releases failed to update", failures.len()));
            }
            println!("All caches are up to date");
            Ok(())
        }
        Some(Commands::Ingest {
            refresh,
            force,
            output,
        }) => {
            let config = load_config(&cli.config)?;
            let pipeline = Pipeline::new(config, Box::new(ComponentListSource))?;
            let mut sink = JsonLinesSink::new(open_output(output.as_deref())?);

            let options = RunOptions {
                refresh: refresh || force,
                force,
            };
            let report = pipeline.run(options, &mut sink)?;
            for failure in &report.failures {
                warn!("{} {} skipped: {}", failure.distro, failure.release, failure.error);
            }
            info!(
                "Wrote {} records ({} releases skipped)",
                report.records.len(),
                report.failures.len()
            );
            Ok(())
        }
        Some(Commands::Releases) => {
            let config = load_config(&cli.config)?;
            let context = DistroContext::new(config)?;
            for retriever in build_retrievers(&context) {
                for release in retriever.get_releases() {
                    let marker = if release.development { " (development)" } else { "" };
                    println!(
                        "{:<12} {:<16} {}{}",
                        retriever.name(),
                        release.codename,
                        release.version,
                        marker
                    );
                }
            }
            Ok(())
        }
        Some(Commands::Probe { resource }) => {
            let resource = Resource::resolve(&resource)?;
            let format = probe_format(&resource, &HttpClient::new()?)?;
            println!("{}: {}", resource, format.style_name());
            Ok(())
        }
        Some(Commands::Packages { name, distro }) => {
            let config = load_config(&cli.config)?;
            let context = DistroContext::new(config)?;

            let mut found = 0;
            for retriever in build_retrievers(&context) {
                if distro
                    .as_deref()
                    .is_some_and(|d| !retriever.name().eq_ignore_ascii_case(d))
                {
                    continue;
                }
                for record in retriever.get_packages_info(&name) {
                    found += 1;
                    println!(
                        "{:<12} {:<16} {:<24} {:<16} {}",
                        retriever.name(),
                        record.release,
                        record.version,
                        record.upstream_version,
                        record.url
                    );
                }
            }
            if found == 0 {
                println!("Package {} not found", name);
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "cptmatch", &mut io::stdout());
            Ok(())
        }
        None => {
            println!("cptmatch v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'cptmatch --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ingest_flags() {
        let cli = Cli::parse_from(["cptmatch", "-c", "dist.toml", "ingest", "--force", "-o", "out.jsonl"]);
        assert_eq!(cli.config, PathBuf::from("dist.toml"));
        match cli.command {
            Some(Commands::Ingest {
                refresh,
                force,
                output,
            }) => {
                assert!(!refresh);
                assert!(force);
                assert_eq!(output, Some(PathBuf::from("out.jsonl")));
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_open_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        {
            let mut out = open_output(Some(&path)).unwrap();
            out.write_all(b"{}\n").unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_missing_config_is_reported() {
        let err = load_config(Path::new("/nonexistent/distributions.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to load configuration"));
    }
}

//! archinc command line

use anyhow::{bail, Context};
use archinc::{
    install, ExtractionWriter, ImportChain, ResolutionIndex, ResolverConfig, SourceManifest,
};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Manifest looked up in the working directory when none is given
const DEFAULT_MANIFEST: &str = "archinc.toml";

/// Log filter variable
const ENV_LOG: &str = "ARCHINC_LOG";

#[derive(Parser)]
#[command(name = "archinc")]
#[command(about = "Resolve modules from archive sources", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every resolvable module
    List {
        #[command(flatten)]
        sources: SourceArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the content of one module
    Show {
        /// Relative module path, e.g. JSON/PP.pm
        name: String,
        #[command(flatten)]
        sources: SourceArgs,
        /// Ordinary search directories tried after the archives
        #[arg(short = 'I', long = "include")]
        include: Vec<PathBuf>,
    },
    /// Write every resolvable module to a directory
    Extract {
        /// Extraction root
        #[arg(long)]
        dir: PathBuf,
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Source specifications: globs, URLs, cpan:// shorthands or __DATA__
    sources: Vec<String>,
    /// Manifest file (defaults to ./archinc.toml when present)
    #[arg(long, short)]
    manifest: Option<PathBuf>,
    /// File that relative globs and __DATA__ refer to
    #[arg(long)]
    caller: Option<PathBuf>,
    /// Mirror base for cpan:// shorthands
    #[arg(long)]
    mirror: Option<String>,
}

/// Sources, configuration and caller assembled from manifest, env and flags
struct Setup {
    sources: Vec<String>,
    config: ResolverConfig,
    caller: PathBuf,
}

impl SourceArgs {
    fn load(self) -> anyhow::Result<Setup> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        let manifest_path = self.manifest.or_else(|| {
            let candidate = cwd.join(DEFAULT_MANIFEST);
            candidate.is_file().then_some(candidate)
        });

        let mut config = match &manifest_path {
            Some(path) => SourceManifest::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?
                .resolver,
            None => ResolverConfig::default(),
        }
        .with_env();
        if let Some(mirror) = self.mirror {
            config = config.mirror_url(mirror);
        }
        config.validate()?;

        let mut sources = std::mem::take(&mut config.sources);
        sources.extend(self.sources);
        if sources.is_empty() {
            bail!("no sources given (pass them as arguments or list them in {})", DEFAULT_MANIFEST);
        }

        let caller = self
            .caller
            .or(manifest_path)
            .unwrap_or_else(|| cwd.join(DEFAULT_MANIFEST));
        let caller = if caller.is_relative() { cwd.join(caller) } else { caller };

        Ok(Setup {
            sources,
            config,
            caller,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { sources, json } => {
            let setup = sources.load()?;
            let index = ResolutionIndex::build(&setup.sources, &setup.caller, &setup.config)?;
            print_index(&index, json)?;
        }
        Commands::Show {
            name,
            sources,
            include,
        } => {
            let setup = sources.load()?;
            let mut chain = ImportChain::new(include);
            install(&mut chain, &setup.sources, &setup.caller, &setup.config)?;

            let Some(module) = chain.require(&name)? else {
                bail!("module '{}' not found", name);
            };
            tracing::info!(%name, origin = %module.origin, version = %module.version, "resolved");

            let content = module.read_to_vec()?;
            std::io::stdout().lock().write_all(&content)?;
        }
        Commands::Extract { dir, sources } => {
            let setup = sources.load()?;
            let index = ResolutionIndex::build(&setup.sources, &setup.caller, &setup.config)?;
            let writer = ExtractionWriter::new(dir);

            for (relative_path, entry) in &index {
                let path = writer.write(relative_path, &entry.version, &entry.content)?;
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn print_index(index: &ResolutionIndex, json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<_> = index
            .iter()
            .map(|(relative_path, entry)| {
                serde_json::json!({
                    "path": relative_path,
                    "version": entry.version,
                    "provenance": entry.provenance,
                    "size": entry.content.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let width = index.relative_paths().map(str::len).max().unwrap_or(0);
    for (relative_path, entry) in index {
        let version = if entry.version.is_empty() { "-" } else { entry.version.as_str() };
        println!(
            "{:<width$}  {:<10}  {}",
            relative_path,
            version,
            entry.provenance,
            width = width
        );
    }
    Ok(())
}

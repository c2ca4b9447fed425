//! # Code Intel CLI (`cix`)
//!
//! Symbol lookups, rank fusion, and artifact staleness checks from the
//! command line, plus the HTTP tool server.
//!
//! ## Usage
//!
//! ```bash
//! cix --config ./config/cix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cix init` | Create an empty Symbol Store with the expected schema |
//! | `cix def <name>` | Print definition sites as JSON |
//! | `cix refs <name>` | Print reference sites as JSON |
//! | `cix fuse` | Fuse lexical and semantic result files with RRF |
//! | `cix check` | Report which discovery artifacts are stale |
//! | `cix stamp <artifact>` | Wrap a generated payload in a fresh envelope |
//! | `cix plan <artifact>` | Show which chunks of an artifact need rebuilding |
//! | `cix stats` | Print Symbol Store counts |
//! | `cix serve` | Start the HTTP tool server |
//!
//! ## Exit codes
//!
//! `def` and `refs` exit `0` when the symbol is found and when it is not;
//! only an unreadable index exits `1`. `check` exits `1` when any artifact
//! is stale.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use code_intel::config::{self, Config};
use code_intel::models::SymbolKind;
use code_intel::{definition, discover, fusion, migrate, references, server, store};

/// Code Intel: symbol lookups, rank fusion, and staleness checks over a
/// pre-built code index.
#[derive(Parser)]
#[command(name = "cix", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cix.toml`. See `config/cix.example.toml`.
    #[arg(long, global = true, default_value = "./config/cix.toml")]
    config: PathBuf,

    /// Log debug output to stderr (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the Symbol Store file and schema.
    ///
    /// Idempotent. The query commands never write to the store; this exists
    /// for indexers and tests that need a blank database.
    Init,

    /// Find where a symbol is defined.
    Def {
        /// Symbol name.
        name: String,

        /// Kind filter: function, class, interface, type, method, property, or any.
        #[arg(long, default_value = "any")]
        kind: String,

        /// Maximum number of definitions.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Find every usage of a symbol.
    Refs {
        /// Symbol name.
        name: String,

        /// Leave out the definition site.
        #[arg(long)]
        no_definition: bool,

        /// Maximum number of references.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Merge a lexical and a semantic result list with reciprocal rank fusion.
    ///
    /// Each input is a JSON array of `{file, line, content}`, best first.
    Fuse {
        #[arg(long)]
        lexical: PathBuf,

        #[arg(long)]
        semantic: PathBuf,

        /// RRF constant (> 0). Defaults to `[retrieval].rrf_k`.
        #[arg(long)]
        k: Option<f64>,

        /// Keep only the top N results (0 keeps all). Defaults to
        /// `[retrieval].final_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check every configured artifact against its sources.
    Check {
        /// Only check these artifacts (comma-separated).
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Wrap a generated payload in an envelope for an artifact.
    Stamp {
        /// Artifact name from `[artifacts.<name>]`.
        artifact: String,

        /// JSON object produced by the generator.
        #[arg(long)]
        payload: PathBuf,
    },

    /// Show which chunks of a chunked artifact must be rebuilt.
    Plan {
        /// Artifact name from `[artifacts.<name>]`.
        artifact: String,
    },

    /// Print Symbol Store statistics.
    Stats,

    /// Start the HTTP tool server on `[server].bind`.
    Serve,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Load the config file, or fall back to defaults when it does not exist.
fn load_or_minimal(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        log::debug!("{} not found, using defaults", path.display());
        Ok(Config::minimal())
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // fuse is pure and works without a config file
    if let Commands::Fuse {
        lexical,
        semantic,
        k,
        limit,
    } = &cli.command
    {
        let cfg = load_or_minimal(&cli.config)?;
        fusion::run_fuse(&cfg, lexical, semantic, *k, *limit)?;
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = config::load_config(&cli.config)?;

    let code = match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Symbol store initialized at {}", cfg.db.path.display());
            ExitCode::SUCCESS
        }
        Commands::Def { name, kind, limit } => {
            let kind: SymbolKind = kind.parse()?;
            exit_code(definition::run_definition(&cfg, &name, kind, limit).await?)
        }
        Commands::Refs {
            name,
            no_definition,
            limit,
        } => exit_code(references::run_references(&cfg, &name, !no_definition, limit).await?),
        Commands::Fuse { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Check { only } => exit_code(discover::run_check(&cfg, &only)?),
        Commands::Stamp { artifact, payload } => {
            discover::run_stamp(&cfg, &artifact, &payload)?;
            ExitCode::SUCCESS
        }
        Commands::Plan { artifact } => {
            discover::run_plan(&cfg, &artifact)?;
            ExitCode::SUCCESS
        }
        Commands::Stats => {
            store::run_stats(&cfg).await?;
            ExitCode::SUCCESS
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

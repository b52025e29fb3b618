//! Swerve CLI - Serve an application behind Swerve, or compute integrity hashes
//!
//! Commands: serve, hash
//! `hash` outputs JSON to stdout
//! Returns non-zero on setup failure

use axum::extract::Request;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use swerve::{
    hash_contents, hash_dir, Assets, Config, ConfigBuilder, ConfigOption, HashVariant, Import,
    Swerve, ENGINE_VERSION,
};

#[derive(Parser)]
#[command(name = "swerve-cli")]
#[command(about = "Swerve CLI - installable script runtime bootstrap server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the Swerve routes in front of a static directory
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Directory served for every non-Swerve path
        #[arg(short, long)]
        static_dir: Option<PathBuf>,

        /// JSON config document used as the base
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        title: Option<String>,

        /// Import by path (repeatable, kept in order)
        #[arg(long = "import-path")]
        import_paths: Vec<String>,

        /// Import inline code (repeatable, after path imports)
        #[arg(long = "import-code")]
        import_codes: Vec<String>,

        /// Trust a literal integrity hash (repeatable)
        #[arg(long = "known-hash")]
        known_hashes: Vec<String>,

        /// Trust every file under this directory (repeatable)
        #[arg(long = "known-hashes-dir")]
        known_hashes_dirs: Vec<PathBuf>,

        /// Digest variants for directory hashing
        #[arg(long = "variant", default_values_t = [HashVariant::default()])]
        variants: Vec<HashVariant>,

        /// Trust the bundled client and core scripts
        #[arg(long)]
        trust_bundled_scripts: bool,

        #[arg(long)]
        no_reload_on_install: bool,

        #[arg(long)]
        claim_on_install: bool,
    },

    /// Print integrity hashes of files or directories as JSON
    Hash {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long = "variant", default_values_t = [HashVariant::default()])]
        variants: Vec<HashVariant>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Hash { paths, variants } => {
            let mut hashes = BTreeSet::new();
            for path in &paths {
                let result = if path.is_dir() {
                    hash_dir(path, &variants)
                } else {
                    std::fs::read(path).map(|data| hash_contents([data], &variants))
                };
                match result {
                    Ok(found) => hashes.extend(found),
                    Err(e) => {
                        println!("{}", failure(format!("{}: {}", path.display(), e)));
                        return ExitCode::FAILURE;
                    }
                }
            }
            match serde_json::to_string_pretty(&hashes) {
                Ok(out) => {
                    println!("{}", out);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}", failure(&e));
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Serve {
            addr,
            static_dir,
            config,
            title,
            import_paths,
            import_codes,
            known_hashes,
            known_hashes_dirs,
            variants,
            trust_bundled_scripts,
            no_reload_on_install,
            claim_on_install,
        } => {
            let base = match config.as_deref().map(Config::load_from_file).transpose() {
                Ok(base) => base.unwrap_or_default(),
                Err(e) => {
                    eprintln!("{}", failure(&e));
                    return ExitCode::FAILURE;
                }
            };

            let mut builder = ConfigBuilder::from_base(base);
            if let Some(title) = title {
                builder = builder.title(title);
            }
            let imports: Vec<Import> = import_paths
                .into_iter()
                .map(Import::path)
                .chain(import_codes.into_iter().map(Import::code))
                .collect();
            if !imports.is_empty() {
                builder = builder.imports(imports);
            }
            if !known_hashes.is_empty() {
                builder = builder.known_hashes(known_hashes);
            }
            for dir in known_hashes_dirs {
                builder = builder.known_hashes_from_dir(dir, &variants);
            }
            if trust_bundled_scripts {
                let assets = Assets::default();
                let bundled: Vec<String> = variants
                    .iter()
                    .flat_map(|v| assets.static_hashes(*v))
                    .collect();
                builder = builder.option(ConfigOption::KnownHashes(bundled));
            }
            if no_reload_on_install {
                builder = builder.no_reload_on_install(true);
            }
            if claim_on_install {
                builder = builder.claim_on_install(true);
            }

            let swerve = match Swerve::from_builder(&builder) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("{}", failure(&e));
                    return ExitCode::FAILURE;
                }
            };

            let app = application(static_dir);
            match serve(addr, swerve.wrap(app)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "server stopped");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// JSON error line for a fatal failure.
fn failure(error: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": error.to_string(),
    })
}

#[tokio::main]
async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, version = ENGINE_VERSION, "swerve listening");
    axum::serve(listener, app).await
}

/// The wrapped application: files from `root`, or 404 for everything.
fn application(root: Option<PathBuf>) -> Router {
    match root {
        Some(root) => Router::new().fallback(move |request: Request| {
            let root = root.clone();
            async move { static_file(&root, request.uri()).await }
        }),
        None => Router::new().fallback(|| async { StatusCode::NOT_FOUND }),
    }
}

async fn static_file(root: &Path, uri: &Uri) -> Response {
    let relative = uri.path().trim_start_matches('/');
    let relative = Path::new(if relative.is_empty() { "index.html" } else { relative });
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut path = root.join(relative);
    if path.is_dir() {
        path = path.join("index.html");
    }
    match tokio::fs::read(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, content_type(&path))], body).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

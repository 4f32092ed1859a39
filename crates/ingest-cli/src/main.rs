mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use ingest_core::{IngestConfig, Ingester};

use crate::config::{retries_from_count, validate_source, AppConfig};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        // Leaked once; lives for the program's lifetime.
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Ingest a live traffic camera stream into local segment files.
#[derive(Parser)]
#[command(name = "camera-ingest", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll a camera and download every new segment until Ctrl+C.
    Watch {
        /// Camera ID, e.g. NCAM070. Overrides the config file.
        camera_id: Option<String>,

        #[command(flatten)]
        opts: IngestOpts,

        /// Print one line per segment as it is acquired.
        #[arg(long, default_value_t = false)]
        follow: bool,
    },
    /// List completed segment files in the output directory, oldest first.
    List {
        #[command(flatten)]
        opts: IngestOpts,
    },
    /// Delete every file in the output directory.
    Clear {
        #[command(flatten)]
        opts: IngestOpts,
    },
}

#[derive(Args)]
struct IngestOpts {
    /// Path to TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory segments are written to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Retries per fetch; -1 retries until stopped.
    #[arg(long, allow_negative_numbers = true)]
    retries: Option<i64>,

    /// Seconds between retries of one fetch.
    #[arg(long)]
    retry_interval: Option<u64>,

    /// Seconds between polls.
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Stream host serving /live/<camera>.stream.
    #[arg(long)]
    host: Option<String>,

    /// Full stream base URL; overrides --host.
    #[arg(long)]
    base_url: Option<String>,

    /// Report every fetch attempt, download and skip.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl IngestOpts {
    /// Config file values with command-line flags layered on top.
    fn resolve(&self, camera_id: Option<String>) -> Result<(AppConfig, IngestConfig), String> {
        let app = match self.config {
            Some(ref path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        let camera_id = camera_id
            .or_else(|| app.ingest.camera_id.clone())
            .unwrap_or_default();

        let mut c = app.ingest.to_ingest_config(&camera_id);
        if let Some(ref dir) = self.output_dir {
            c = c.with_output_dir(dir);
        }
        if let Some(n) = self.retries {
            c = c.with_max_retries(retries_from_count(n));
        }
        if let Some(secs) = self.retry_interval {
            c = c.with_retry_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.poll_interval {
            c = c.with_poll_interval(Duration::from_secs(secs.max(1)));
        }
        if let Some(ref host) = self.host {
            c = c.with_host(host);
        }
        if let Some(ref url) = self.base_url {
            c = c.with_base_url(url);
        }
        if self.verbose {
            c = c.with_verbose(true);
        }
        validate_source(&c.host, c.base_url.as_deref())?;
        Ok((app, c))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Watch {
            camera_id,
            opts,
            follow,
        } => match opts.resolve(camera_id) {
            Ok((app, config)) => {
                init_tracing(&app.logging.format);
                run_watch(config, follow).await
            }
            Err(e) => fail(&e),
        },
        Commands::List { opts } => match opts.resolve(None) {
            Ok((app, config)) => {
                init_tracing(&app.logging.format);
                run_list(config).await
            }
            Err(e) => fail(&e),
        },
        Commands::Clear { opts } => match opts.resolve(None) {
            Ok((app, config)) => {
                init_tracing(&app.logging.format);
                run_clear(config).await
            }
            Err(e) => fail(&e),
        },
    };

    std::process::exit(code);
}

fn fail(message: &str) -> i32 {
    init_tracing("pretty");
    tracing::error!("{}", message);
    1
}

async fn run_watch(config: IngestConfig, follow: bool) -> i32 {
    if config.camera_id.trim().is_empty() {
        tracing::error!("No camera ID given (argument or [ingest].camera_id)");
        return 2;
    }

    let cancel = CancellationToken::new();
    let ingester = match Ingester::from_config(config, cancel) {
        Ok(i) => i,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return 1;
        }
    };

    let c = ingester.config();
    println!(
        "{} {}",
        style("camera-ingest").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {} {}", style("camera:").dim(), style(&c.camera_id).bold());
    println!("  {} {}", style("stream:").dim(), ingester.source().base_url());
    println!("  {} {}", style("output:").dim(), c.output_dir.display());
    println!("  {} {}s", style("poll:  ").dim(), c.poll_interval.as_secs());
    match c.max_retries {
        Some(n) => println!(
            "  {} {} every {}s",
            style("retry: ").dim(),
            n,
            c.retry_interval.as_secs()
        ),
        None => println!(
            "  {} unbounded, every {}s",
            style("retry: ").dim(),
            c.retry_interval.as_secs()
        ),
    }
    println!();
    println!("{}", style("Press Ctrl+C to stop").dim());
    println!();

    if let Err(e) = ingester.start().await {
        tracing::error!(error = %e, "Failed to start ingester");
        return 1;
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut last_reported = None;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = &mut shutdown => break,
        }

        if follow {
            while let Some(name) = ingester.next_segment().await {
                println!("  {} {}", style("NEW  ").green(), name);
            }
        }

        // Newest first; print anything recorded since the last pass, oldest first.
        let errors = ingester.errors().await;
        let fresh: Vec<_> = errors
            .iter()
            .take_while(|e| Some(e.timestamp) > last_reported)
            .collect();
        for e in fresh.iter().rev() {
            println!(
                "  {}  {} {:<18} {}",
                style(e.timestamp.format("%H:%M:%S")).dim(),
                style("ERROR").red().bold(),
                style(e.error_type.to_string()).red(),
                e.details
            );
        }
        if let Some(newest) = errors.first() {
            last_reported = Some(newest.timestamp);
        }
    }

    ingester.stop().await;
    println!("\n{}", style("Ingester stopped.").dim());
    0
}

async fn run_list(config: IngestConfig) -> i32 {
    let ingester = match offline_ingester(config) {
        Some(i) => i,
        None => return 1,
    };
    match ingester.list_segments().await {
        Ok(paths) => {
            for p in paths {
                println!("{}", p.display());
            }
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list segments");
            1
        }
    }
}

async fn run_clear(config: IngestConfig) -> i32 {
    let ingester = match offline_ingester(config) {
        Some(i) => i,
        None => return 1,
    };
    match ingester.clear_segments().await {
        Ok(removed) => {
            println!(
                "Removed {} files from {}",
                removed,
                ingester.store().dir().display()
            );
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to clear segment directory");
            1
        }
    }
}

/// Ingester for the directory-only commands; it is never started.
fn offline_ingester(config: IngestConfig) -> Option<Ingester> {
    match Ingester::from_config(config, CancellationToken::new()) {
        Ok(i) => Some(i),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            None
        }
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init: a subscriber may already be installed.
    let _ = match log_format {
        "json" => fmt().with_env_filter(filter).json().try_init(),
        _ => fmt().with_env_filter(filter).try_init(),
    };
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> IngestOpts {
        IngestOpts {
            config: None,
            output_dir: None,
            retries: None,
            retry_interval: None,
            poll_interval: None,
            host: None,
            base_url: None,
            verbose: false,
        }
    }

    #[test]
    fn flags_override_defaults() {
        let o = IngestOpts {
            retries: Some(-1),
            base_url: Some("http://127.0.0.1:9000/live/NCAM070.stream".into()),
            ..opts()
        };
        let (_, c) = o.resolve(Some("NCAM070".into())).unwrap();
        assert_eq!(c.camera_id, "NCAM070");
        assert_eq!(c.max_retries, None);
        assert_eq!(c.base_url.as_deref(), Some("http://127.0.0.1:9000/live/NCAM070.stream"));
    }

    #[test]
    fn flag_base_url_must_be_http() {
        let o = IngestOpts {
            base_url: Some("ftp://example.com/live/x.stream".into()),
            ..opts()
        };
        let err = o.resolve(Some("NCAM070".into())).unwrap_err();
        assert!(err.contains("http or https"), "{}", err);
    }

    #[test]
    fn flag_host_must_not_be_empty() {
        let o = IngestOpts {
            host: Some(" ".into()),
            ..opts()
        };
        let err = o.resolve(Some("NCAM070".into())).unwrap_err();
        assert!(err.contains("Host must not be empty"), "{}", err);
    }
}

//! v8host
//!
//! Runs requests through the V8 engine host: loads a bootstrap script that
//! defines the dispatcher, then sends each request to `runscript_v8`.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use v8host_runtime::{EngineConfig, FsLoader, HostModule, RUNGC_CALL, RUNSCRIPT_CALL, platform};

/// V8 script engine host
#[derive(Parser, Debug)]
#[command(name = "v8host")]
#[command(about = "Run requests through a V8 bootstrap dispatcher", long_about = None)]
struct Args {
    /// Bootstrap script defining the dispatcher function
    bootstrap: PathBuf,

    /// Requests to run; read from stdin when omitted
    requests: Vec<String>,

    /// Engine configuration as a TOML table of V8_* keys (defaults to the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for scripts passed to load() (defaults to the bootstrap's directory)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Number of threads running the requests, each with its own engine
    #[arg(short, long, default_value = "1")]
    threads: usize,

    /// Collect garbage after every request
    #[arg(long)]
    gc: bool,

    /// Print the effective engine configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("v8host=info,v8host_runtime=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    check_args(&args)?;

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config.to_json())?);
        return Ok(());
    }

    let bootstrap = std::fs::read(&args.bootstrap)
        .with_context(|| format!("Failed to read bootstrap script {}", args.bootstrap.display()))?;
    let root = match &args.root {
        Some(root) => root.clone(),
        None => args
            .bootstrap
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let requests = if args.requests.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read request from stdin")?;
        vec![input]
    } else {
        args.requests.clone()
    };

    info!("Starting v8host v{}", env!("CARGO_PKG_VERSION"));
    platform::initialize(&config).context("Failed to initialize V8 platform")?;
    let module = Arc::new(HostModule::with_initialized_platform(
        config,
        bootstrap,
        Arc::new(FsLoader::new(root)),
    ));

    let requests = Arc::new(requests);
    let workers: Vec<_> = (0..args.threads)
        .map(|index| {
            let module = module.clone();
            let requests = requests.clone();
            let gc = args.gc;
            thread::Builder::new()
                .name(format!("v8host-worker-{}", index))
                .spawn(move || run_worker(&module, &requests, gc))
        })
        .collect::<std::io::Result<_>>()
        .context("Failed to spawn worker thread")?;

    let mut failures = 0;
    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("{:#}", e);
                failures += 1;
            }
            Err(_) => {
                error!("Worker thread panicked");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{} worker(s) failed", failures);
    }
    Ok(())
}

fn check_args(args: &Args) -> Result<()> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_toml_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))
        }
        None => EngineConfig::from_process_env()
            .context("Invalid engine configuration in environment"),
    }
}

/// Run every request on this thread's engine, then dispose it.
fn run_worker(module: &HostModule, requests: &[String], gc: bool) -> Result<()> {
    let result = run_requests(module, requests, gc);
    module.thread_cleaner()(thread::current().id());
    result
}

fn run_requests(module: &HostModule, requests: &[String], gc: bool) -> Result<()> {
    for request in requests {
        let reply = module
            .call(RUNSCRIPT_CALL, request.as_bytes())
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Request failed: {}", request.trim()))?;
        match reply {
            Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
            None => println!("null"),
        }
        if gc {
            module.call(RUNGC_CALL, b"").map_err(anyhow::Error::msg)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_args_defaults() {
        let args = parse(&["v8host", "boot.js", "req-a", "req-b"]);
        assert_eq!(args.bootstrap, PathBuf::from("boot.js"));
        assert_eq!(args.requests, vec!["req-a".to_string(), "req-b".to_string()]);
        assert_eq!(args.threads, 1);
        assert!(!args.gc);
        assert!(!args.print_config);
        assert!(check_args(&args).is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let args = parse(&["v8host", "boot.js", "--threads", "0"]);
        let err = check_args(&args).unwrap_err();
        assert!(err.to_string().contains("--threads"));
    }

    #[test]
    fn test_load_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "V8_thread_pool_size = \"4\"\nV8_max_old_space_size = \"512\"\n")
            .unwrap();

        let config_arg = path.to_string_lossy();
        let args = parse(&["v8host", "boot.js", "--config", &*config_arg]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.thread_pool_size, 4);
        assert_eq!(config.max_old_space_size, 512);
    }

    #[test]
    fn test_load_config_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "V8_heap = \"1\"\n").unwrap();

        let config_arg = path.to_string_lossy();
        let args = parse(&["v8host", "boot.js", "--config", &*config_arg]);
        let err = load_config(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("V8_heap"));
        assert!(err.to_string().contains("engine.toml"));

        let missing = dir.path().join("missing.toml");
        let missing_arg = missing.to_string_lossy();
        let args = parse(&["v8host", "boot.js", "--config", &*missing_arg]);
        assert!(load_config(&args).unwrap_err().to_string().contains("Failed to read config"));
    }
}

use clap::Parser;
use flux::analytics::AnalyticsWorker;
use flux::cli::{run_clear, run_init, run_inspect, Cli, Command};
use flux::config::FluxConfig;
use flux::server::Server;
use flux::store::{RedisStore, Store};
use std::sync::Arc;

fn init_tracing(log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("flux.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Some(Command::Init { path, force }) = &cli.command {
        std::process::exit(run_init(path.clone(), *force));
    }

    let config = FluxConfig::load(cli.config.as_deref())?;
    let _log_guard = init_tracing(config.flux.log_file.as_deref());

    match cli.command {
        Some(Command::Clear) => std::process::exit(run_clear(&config).await),
        Some(Command::Inspect) => std::process::exit(run_inspect(&config).await),
        Some(Command::Init { .. }) => unreachable!("handled above"),
        Some(Command::Serve) | None => {}
    }

    let store = Arc::new(
        RedisStore::connect(&config.redis_url(), config.redis.pool_size, config.redis.timeout_ms).await?,
    );
    store.preload_scripts().await?;
    tracing::info!("preloaded policy scripts");

    let config = Arc::new(config);

    if config.flux.analytics_enabled {
        let worker = AnalyticsWorker::new(
            store.clone() as Arc<dyn flux::store::Store>,
            config.flux.analytics_stream.clone(),
            config.flux.key_prefix.clone(),
        );
        tokio::spawn(async move {
            if let Err(err) = worker.run().await {
                tracing::error!("analytics worker exited: {err}");
            }
        });
    }

    let server = Server::new(store, config);
    server.run().await?;

    Ok(())
}
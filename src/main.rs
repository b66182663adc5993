use clap::Parser;
use marginalia::config::{Cli, Config};
use marginalia::notion::NotionClient;
use marginalia::source::KoboDatabase;
use marginalia::sync::{SyncEngine, SyncOptions};
use marginalia::throttle::Throttle;
use marginalia::unpack_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("marginalia starting");

    let cfg = Config::load(args.config_path.as_deref()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?args.config_path, "failed to load config");
        std::process::exit(1);
    });
    let chunk_size = cfg.sync.chunk_size().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid chunk size");
        std::process::exit(1);
    });

    let source = KoboDatabase::open(&cfg.database_path()).await.unwrap_or_else(|e| {
        tracing::error!(error = %unpack_error(&e), "failed to open highlight database");
        std::process::exit(1);
    });
    let remote = NotionClient::new(&cfg.notion.token, &cfg.notion.database_id, &cfg.notion.api_base)
        .unwrap_or_else(|e| {
            tracing::error!(error = %unpack_error(&e), "failed to build notion client");
            std::process::exit(1);
        });

    let options = SyncOptions {
        chunk_size,
        strict_completion: cfg.sync.strict_completion,
        ..SyncOptions::default()
    };
    let engine = SyncEngine::new(&source, &remote, Throttle::new(cfg.sync.delay()), options);

    // Per-book failures are logged inside the loop and never change the exit code.
    match engine.run().await {
        Ok(stats) => tracing::info!(
            created = stats.created,
            resumed = stats.resumed,
            skipped = stats.skipped,
            failed = stats.failed,
            highlights_appended = stats.highlights_appended,
            failed_chunks = stats.failed_chunks,
            left_incomplete = stats.left_incomplete,
            "sync finished"
        ),
        Err(e) => {
            tracing::error!(error = %unpack_error(&e), "failed to list books");
            std::process::exit(1);
        }
    }
}

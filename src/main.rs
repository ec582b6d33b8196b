use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imageloader::domain::{DeliveryQueue, ImageUrl};
use imageloader::infrastructure::{AppConfig, CliArgs, ImageLoader, StorageManager};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = imageloader::VERSION, "Starting imageloader");

    // Completions are drained on this task, the way a UI drains its main queue.
    let (mut main_queue, main_context) = DeliveryQueue::new();
    let loader = ImageLoader::from_config(config.loader.clone())?.with_default_context(main_context);

    let repeat = args.repeat.max(1);
    let expected = args.urls.len() * repeat;
    let failures = Arc::new(AtomicUsize::new(0));

    for raw in &args.urls {
        let url = ImageUrl::new(raw.as_str());
        for _ in 0..repeat {
            let url_for_print = url.clone();
            let failures = failures.clone();
            loader.load(url.clone(), move |result| match result {
                Ok(image) => println!("{url_for_print}: {}x{}", image.width(), image.height()),
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    eprintln!("{url_for_print}: {e}");
                }
            });
        }
    }

    let mut delivered = 0;
    while delivered < expected && main_queue.run_next().await {
        delivered += 1;
    }

    let stats = loader.stats().await;
    info!(
        fetches = stats.fetches_started,
        joins = stats.joins,
        "{}",
        stats.cache
    );

    let failed = failures.load(Ordering::Relaxed);
    if failed > 0 {
        return Err(eyre!("{failed} of {expected} loads failed"));
    }

    Ok(())
}

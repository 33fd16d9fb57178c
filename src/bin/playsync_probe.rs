use std::env;
use std::sync::Arc;
use tracing::{error, info};

use playsync::playback::reconcile;
use playsync::position_store::PositionCache;
use playsync::remote::{HttpRemoteService, RemotePositions};
use playsync::{SyncConfig, TrackPosition};

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let config = SyncConfig::load();
    let cache = match PositionCache::open(config.store_dir.clone()).await {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open position store {}: {}", config.store_dir.display(), e);
            std::process::exit(1);
        }
    };
    let remote = match HttpRemoteService::from_config(&config) {
        Ok(service) => Some(RemotePositions::new(
            Arc::new(service),
            config.remote_throttle_window,
        )),
        Err(e) => {
            info!("Only reading local positions: {}", e);
            None
        }
    };

    for track_id in &args[1..] {
        let local = cache.load(track_id).await;
        let remote_record = match &remote {
            Some(remote) => remote.fetch(track_id).await,
            None => TrackPosition::zero(track_id),
        };
        let resumed = reconcile(local.clone(), remote_record.clone());

        println!("{}", track_id);
        println!("  local:   {}", describe(&local));
        println!("  remote:  {}", describe(&remote_record));
        println!("  resumes: {:.1}s", resumed.position_seconds);
    }
}

fn describe(record: &TrackPosition) -> String {
    match record.updated_at {
        Some(updated_at) => format!("{:.1}s at {}", record.position_seconds, updated_at),
        None => "never recorded".to_string(),
    }
}

fn print_usage(program_name: &str) {
    eprintln!("Usage:");
    eprintln!("  {} <track_id>...", program_name);
    eprintln!();
    eprintln!("Shows the saved local and remote positions of each track and");
    eprintln!("where playback would resume.");
}

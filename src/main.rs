//! Binary entrypoint for the Sidequest CLI.
//!
//! Commands:
//! - `init` - create a starter `config.toml`
//! - `discover [--radius <km>] [--category <c>]... [--search <text>] [--sort <key>]` -
//!   run one discovery session against the configured service and print the result
//! - `favorites --user <id>` - list the stored favorites for a user
//!
//! See the library crate docs for module-level details: `sidequest::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use sidequest::config::Config;
use sidequest::engine::favorites::FavoriteStore;
use sidequest::engine::location::LocationProvider;
use sidequest::engine::{start_engine, DiscoveryView, EngineDeps, EngineHandle};
use sidequest::model::SortKey;
use sidequest::remote::{Geocoder, HeadlessMapLibrary, HttpGeocoder, QuestApiClient};
use sidequest::storage::SledDocumentStoreBuilder;

#[derive(Parser)]
#[command(name = "sidequest")]
#[command(about = "Location-anchored quest discovery against a generation service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init,
    /// Run one discovery session and print the visible quests
    Discover {
        /// Maximum search radius in kilometers (overrides config)
        #[arg(short, long)]
        radius: Option<f64>,
        /// Category hint; repeat for several
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Client-side text filter applied after the fetch
        #[arg(short, long)]
        search: Option<String>,
        /// Sort order: distance, distance-desc, name, name-desc, price, price-desc, time, time-desc
        #[arg(long)]
        sort: Option<String>,
        /// Act as this signed-in user (enables favorites)
        #[arg(short, long)]
        user: Option<String>,
        /// Seconds to wait for the session to settle
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// List stored favorites for a user, most recent first
    Favorites {
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new discovery configuration");
            Config::create_default(&cli.config).await?;
            println!("Configuration file created at {}", cli.config);
        }
        Commands::Discover {
            radius,
            categories,
            search,
            sort,
            user,
            timeout,
        } => {
            let config = match pre_config {
                Some(cfg) => cfg,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting Sidequest v{}", env!("CARGO_PKG_VERSION"));

            let sort_key = match sort.as_deref() {
                Some(s) => Some(SortKey::parse(s).ok_or_else(|| {
                    anyhow::anyhow!("unknown sort key '{s}' (try 'distance' or 'price-desc')")
                })?),
                None => None,
            };

            let mut discovery = config.discovery.clone();
            if let Some(max_km) = radius {
                discovery.max_radius_km = max_km;
            }
            if !categories.is_empty() {
                discovery.categories = categories;
            }

            let store = SledDocumentStoreBuilder::new(&config.storage.data_dir).open()?;
            let geocoder: Option<Arc<dyn Geocoder>> = config.geocode.enabled.then(|| {
                Arc::new(HttpGeocoder::new(
                    config.geocode.base_url.clone(),
                    config.geocode.api_key.clone(),
                    config.geocode.timeout_seconds,
                )) as Arc<dyn Geocoder>
            });
            let deps = EngineDeps {
                service: Arc::new(QuestApiClient::new(config.api.clone())),
                library: Arc::new(HeadlessMapLibrary),
                store: Arc::new(store),
                location: LocationProvider::from_config(&config.location),
                geocoder,
                user_id: user,
            };

            let handle = start_engine(discovery, deps);
            if let Some(text) = search {
                handle.search(text);
            }
            if let Some(key) = sort_key {
                handle.set_sort(key);
            }

            match wait_for_settle(&handle, Duration::from_secs(timeout)).await {
                Some(view) => print_view(&view),
                None => warn!("session ended before it could settle"),
            }
            handle.shutdown().await;
        }
        Commands::Favorites { user } => {
            let config = match pre_config {
                Some(cfg) => cfg,
                None => Config::load(&cli.config).await?,
            };
            let store = SledDocumentStoreBuilder::new(&config.storage.data_dir).open()?;
            let mut favorites = FavoriteStore::new(Arc::new(store), Some(user.clone()));
            let count = favorites.hydrate().await?;
            if count == 0 {
                println!("No favorites stored for {user}.");
            } else {
                println!("{count} favorite(s) for {user}:");
                for record in favorites.records() {
                    println!(
                        "  {}  {}  (added {})",
                        record.item_id,
                        record.quest_data.title,
                        record.added_at.format("%Y-%m-%d")
                    );
                }
            }
        }
    }

    Ok(())
}

/// Poll snapshots until the first fetch resolves one way or the other.
async fn wait_for_settle(handle: &EngineHandle, timeout: Duration) -> Option<DiscoveryView> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let view = handle.snapshot().await?;
        let fetch_done = !view.loading && (view.fetched_count > 0 || view.fetch_error.is_some());
        if fetch_done && view.location.is_some() {
            return Some(view);
        }
        if tokio::time::Instant::now() >= deadline {
            return Some(view);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn print_view(view: &DiscoveryView) {
    if let Some(area) = &view.area_name {
        println!("Near {area}");
    }
    if let Some(warning) = &view.location_warning {
        println!("! {warning}");
    }
    if view.map_failed {
        println!("! Map unavailable; showing list only.");
    }
    if let Some(error) = &view.fetch_error {
        println!("! {error}");
        return;
    }
    if view.quests.is_empty() {
        println!("No quests found. Try widening the radius.");
        return;
    }
    println!(
        "{} quest(s) shown ({} fetched, {} marker(s)):",
        view.quests.len(),
        view.fetched_count,
        view.marker_count
    );
    for (index, quest) in view.quests.iter().enumerate() {
        let distance = quest
            .distance_km
            .map(|d| format!("{d:.1} km"))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:>3}. {}  [{} | ${:.0} | {} min]",
            index + 1,
            quest.title,
            distance,
            quest.estimated_cost,
            quest.estimated_time_minutes
        );
        if !quest.description.is_empty() {
            println!("     {}", quest.description);
        }
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => match config.as_ref().map(|c| c.logging.level.as_str()) {
            Some("debug") => log::LevelFilter::Debug,
            Some("trace") => log::LevelFilter::Trace,
            Some("warn") => log::LevelFilter::Warn,
            _ => log::LevelFilter::Info,
        },
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Some(file) = config.as_ref().and_then(|c| c.logging.file.clone()) {
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
        {
            let mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            let write_mutex = mutex.clone();
            // TTY check: in a redirected/cron context skip console duplicates
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        } else {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

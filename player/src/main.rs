use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use quadview_common::SlotKey;
use quadview_player::config::{self, ConfigManager, EnvConfigOverride};
use quadview_player::ffmpeg::FfmpegBackend;
use quadview_player::mode_switch::ModeSwitchScheduler;
use quadview_player::registry::StreamRegistry;
use quadview_player::results::{summary_text, MetricTable};
use quadview_player::timeline::TimelineSynchronizer;
use quadview_player::{PlayerEngine, TransportController};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Containers accepted for slot sources
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

fn cli() -> Command {
    Command::new("quadview")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Synchronized playback of up to four video sources")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .value_parser(value_parser!(PathBuf))
                .default_value("quadview.toml"),
        )
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .value_name("KEY=PATH")
                .help("Open PATH into slot KEY (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("play")
                .long("play")
                .help("Start playback once every slot has a source")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("duration-secs")
                .long("duration-secs")
                .value_name("SECONDS")
                .help("Stop after this many seconds instead of waiting for Ctrl+C")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("results-baseline")
                .long("results-baseline")
                .value_name("CSV")
                .help("Metrics table of the baseline model")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("results-improved")
                .long("results-improved")
                .value_name("CSV")
                .help("Metrics table of the improved model")
                .value_parser(value_parser!(PathBuf)),
        )
}

fn parse_source(value: &str) -> Result<(SlotKey, PathBuf)> {
    let (key, path) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=PATH, got {:?}", value))?;
    let key: SlotKey = key.parse().map_err(|e: String| anyhow!(e))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(anyhow!("empty path for slot {}", key));
    }
    Ok((key, PathBuf::from(path)))
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

async fn load_results(matches: &ArgMatches, id: &str) -> Option<MetricTable> {
    let path = matches.get_one::<PathBuf>(id)?;
    match MetricTable::load(path).await {
        Ok(table) => {
            for (metric, mean) in table.metric_means() {
                info!("  {} {}: {:.3}", id, metric, mean);
            }
            Some(table)
        }
        Err(e) => {
            warn!("Could not load {:?}: {}", path, e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("quadview.toml"));
    let mut manager = ConfigManager::new(config_path);
    manager.load().await?;
    let mut config = manager.into_config();
    EnvConfigOverride::apply_overrides(&mut config);

    if let Some(values) = matches.get_many::<String>("source") {
        for value in values {
            let (key, path) = parse_source(value)?;
            config.slots.sources.insert(key, path);
        }
    }
    config::validate(&config)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .init();

    info!("quadview starting: slots={:?}", config.slots.keys);

    if matches.contains_id("results-baseline") || matches.contains_id("results-improved") {
        let baseline = load_results(&matches, "results-baseline").await;
        let improved = load_results(&matches, "results-improved").await;
        info!("{}", summary_text(baseline.as_ref(), improved.as_ref()));
    }

    let backend = Arc::new(FfmpegBackend::new(config.ffmpeg.clone()));
    let controller = TransportController::new(
        StreamRegistry::new(config.slots.keys.clone(), backend),
        TimelineSynchronizer::new(config.timeline),
        ModeSwitchScheduler::new(
            config.mode_switch.primary_dwell,
            config.mode_switch.secondary_dwell,
        ),
    );
    let engine = PlayerEngine::spawn(controller);
    let handle = engine.handle();

    for (slot, path) in &config.slots.sources {
        if !has_video_extension(path) {
            warn!("Slot {}: {:?} is not an .mp4, .avi or .mov file, skipped", slot, path);
            continue;
        }
        if let Err(e) = handle.open_source(slot.clone(), path.clone()).await {
            warn!("Slot {}: {}", slot, e);
        }
    }

    let status = handle.status().await?;
    info!(
        "{} of {} slot(s) loaded, {} frames @ {:.2} fps",
        status.valid_slots.len(),
        config.slots.keys.len(),
        status.timeline.total_frames,
        status.timeline.fps
    );

    if matches.get_flag("play") {
        if status.controls_enabled {
            handle.toggle_play_pause().await?;
        } else {
            warn!("Not every slot has a source, playback stays paused");
        }
    }

    match matches.get_one::<u64>("duration-secs") {
        Some(secs) => tokio::time::sleep(Duration::from_secs(*secs)).await,
        None => {
            info!("Press Ctrl+C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    let status = handle.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    handle.shutdown().await?;
    engine.join().await?;
    info!("quadview stopped");
    Ok(())
}

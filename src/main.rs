use chrono::{Local, TimeDelta};
use clap::{Parser, Subcommand};
use live_alert::asset_cache::AssetCache;
use live_alert::channel::validate_name;
use live_alert::audio_runtime::{AudioEvent, spawn_audio_runtime};
use live_alert::channel_list::load_channel_list;
use live_alert::logging::init_logging;
use live_alert::monitor::{Monitor, MonitorOptions};
use live_alert::player::{Playback, Player};
use live_alert::probe::{HttpFetch, ReqwestFetch, build_probe};
use live_alert::scheduler::{Clock, PollScheduler, SystemClock};
use live_alert::settings::{ProbeStrategy, Settings, default_settings_path};
use live_alert::speech::HttpSpeech;
use live_alert::status::{print_table, render_table};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "livealert", about = "Spoken notifications when watched channels go live")]
struct Cli {
    /// Channel list, one `name=true|false` per line
    #[arg(short, long, default_value = "streams.txt", global = true)]
    streams: PathBuf,
    /// Settings file (JSON). Defaults to the per-user config location.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Liveness heuristic: page-keyword, uptime-text or thumbnail (overrides settings)
    #[arg(long, global = true)]
    strategy: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch all channels and announce when they go live (default)
    Watch {
        /// Seconds between polling cycles (overrides settings)
        #[arg(short, long)]
        interval: Option<u64>,
        /// Seconds an offline->live edge must be apart to announce again (overrides settings)
        #[arg(short, long)]
        cooldown: Option<u64>,
        /// Playback volume in (0, 1] (overrides settings)
        #[arg(short, long)]
        volume: Option<f32>,
        /// Directory holding cached announcement clips (overrides settings)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Probe channels concurrently
        #[arg(long)]
        parallel: bool,
        /// Play announcements on a background queue instead of blocking the cycle
        #[arg(long)]
        queued: bool,
        /// Skip the pause before the first cycle
        #[arg(long)]
        no_delay: bool,
    },
    /// Show the parsed channel list
    Channels,
    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
    /// Probe one channel once and print the result
    Probe {
        /// Channel name
        channel: String,
    },
    /// Fetch (or synthesize) a channel's announcement and play it
    Speak {
        /// Channel name
        channel: String,
        /// Playback volume in (0, 1] (overrides settings)
        #[arg(short, long)]
        volume: Option<f32>,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the effective settings as JSON
    Show,
    /// Write the effective settings to the settings file
    Init,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        fail(&format!("cannot open log file: {}", e));
    }

    let mut settings = match &cli.settings {
        Some(path) => Settings::load_strict(path).unwrap_or_else(|e| fail(&error_chain(&e))),
        None => Settings::load(&default_settings_path()),
    };
    if let Some(name) = &cli.strategy {
        settings.probe = ProbeStrategy::from_str_loose(name).unwrap_or_else(|e| fail(&e));
    }

    match cli.command.unwrap_or(Commands::Watch {
        interval: None,
        cooldown: None,
        volume: None,
        cache_dir: None,
        parallel: false,
        queued: false,
        no_delay: false,
    }) {
        Commands::Watch {
            interval,
            cooldown,
            volume,
            cache_dir,
            parallel,
            queued,
            no_delay,
        } => {
            if let Some(secs) = interval {
                settings.poll_interval_secs = secs;
            }
            if let Some(secs) = cooldown {
                settings.cooldown_secs = secs;
            }
            if let Some(v) = volume {
                settings.volume = v;
            }
            if let Some(dir) = cache_dir {
                settings.cache_dir = dir;
            }
            settings.parallel_probes |= parallel;
            settings.queued_playback |= queued;
            if no_delay {
                settings.startup_delay_secs = 0;
            }
            watch(&cli.streams, settings);
        }
        Commands::Channels => {
            let channels =
                load_channel_list(&cli.streams).unwrap_or_else(|e| fail(&error_chain(&e)));
            if channels.is_empty() {
                println!("No channels in '{}'.", cli.streams.display());
            }
            for c in &channels {
                let notify = if c.notify_enabled { "announce" } else { "silent" };
                println!("{:<17} {}", c.name, notify);
            }
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => match serde_json::to_string_pretty(&settings) {
                Ok(json) => println!("{}", json),
                Err(e) => fail(&format!("cannot serialize settings: {}", e)),
            },
            ConfigCmd::Init => {
                validate(&settings);
                let path = cli.settings.clone().unwrap_or_else(default_settings_path);
                if let Err(e) = settings.save(&path) {
                    fail(&error_chain(&e));
                }
                println!("Settings written to '{}'.", path.display());
            }
        },
        Commands::Probe { channel } => {
            validate(&settings);
            let probe = build_probe(&settings, http(&settings));
            let live = probe.probe(&channel);
            println!(
                "{} is {} ({} probe)",
                channel,
                if live { "LIVE" } else { "offline" },
                settings.probe
            );
        }
        Commands::Speak { channel, volume } => {
            if let Some(v) = volume {
                settings.volume = v;
            }
            validate(&settings);
            if let Err(e) = validate_name(&channel) {
                fail(&e.to_string());
            }
            let cache = clip_cache(&settings, http(&settings));
            let clip = cache.get_audio(&channel);
            if clip.is_empty() {
                fail(&format!("no announcement clip for '{}'", channel));
            }
            let mut player = Player::new();
            if let Err(e) = player.play_clip(&clip, settings.volume) {
                fail(&error_chain(&e));
            }
        }
    }
}

fn watch(streams: &std::path::Path, settings: Settings) {
    validate(&settings);
    let channels = load_channel_list(streams).unwrap_or_else(|e| fail(&error_chain(&e)));
    if channels.is_empty() {
        warn!("no channels configured in {}", streams.display());
    }

    let fetch = http(&settings);
    let probe = build_probe(&settings, fetch.clone());
    let cache = clip_cache(&settings, fetch);

    let playback: Box<dyn Playback> = if settings.queued_playback {
        let handle = spawn_audio_runtime(|event| {
            if let AudioEvent::PlayError(e) = event {
                debug!("queued clip failed: {}", e);
            }
        })
        .unwrap_or_else(|e| fail(&format!("cannot start audio thread: {}", e)));
        Box::new(handle)
    } else {
        Box::new(Player::new())
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let options = MonitorOptions {
        cooldown: settings.cooldown(),
        volume: settings.volume,
        parallel_probes: settings.parallel_probes,
    };
    let mut monitor = Monitor::new(channels, probe, cache, playback, clock.clone(), options);

    println!(
        "Watching {} channel(s) from '{}' ({} probe, every {}s, cooldown {}s)",
        monitor.channels().len(),
        streams.display(),
        settings.probe,
        settings.poll_interval_secs,
        settings.cooldown_secs
    );
    monitor.prime();
    print!("{}", render_table(monitor.states(), true));

    if settings.startup_delay_secs > 0 {
        println!("Starting in {} seconds...", settings.startup_delay_secs);
        clock.sleep(settings.startup_delay());
    }

    let interval_secs = settings.poll_interval_secs;
    let mut scheduler = PollScheduler::new(clock, settings.poll_interval());
    monitor.run(&mut scheduler, |states, _| {
        let next = Local::now() + TimeDelta::seconds(interval_secs as i64);
        let footer = format!(
            "Next check at {} (every {}s)",
            next.format("%H:%M:%S"),
            interval_secs
        );
        if let Err(e) = print_table(states, &footer) {
            warn!("cannot draw status table: {}", e);
        }
    })
}

fn http(settings: &Settings) -> Arc<dyn HttpFetch> {
    match ReqwestFetch::new(settings.http_timeout()) {
        Ok(fetch) => Arc::new(fetch),
        Err(e) => fail(&error_chain(&e)),
    }
}

fn clip_cache(settings: &Settings, fetch: Arc<dyn HttpFetch>) -> AssetCache {
    let synth = HttpSpeech::new(fetch, &settings.speech_endpoint, &settings.voice);
    AssetCache::new(&settings.cache_dir, Box::new(synth))
}

fn validate(settings: &Settings) {
    if let Err(e) = settings.validate() {
        fail(&e.to_string());
    }
}

/// Error message followed by its causes.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    msg
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

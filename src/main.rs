//! Standalone CLI monitor for the election results live feed
//!
//! Run with: cargo run --features cli -- [--mute] [URL]

#[cfg(not(target_arch = "wasm32"))]
use clap::Parser;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Parser, Debug)]
#[command(name = "election-live", about = "Follow the election results live feed")]
struct Args {
    /// Event stream endpoint
    #[arg(env = election_live::config::ENV_SSE_URL)]
    url: Option<String>,

    /// Start with alert chimes muted
    #[arg(long)]
    mute: bool,
}

#[cfg(not(target_arch = "wasm32"))]
impl Args {
    fn config(&self) -> election_live::LiveConfig {
        let mut config = election_live::LiveConfig::from_env();
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        config
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use election_live::source::HttpEventSource;
    use election_live::time::now_millis;
    use election_live::{
        DashboardState, LiveEventClient, Reaction, ScrapeCountdown, CHIME_DURATION, CHIME_GAIN,
    };
    use std::time::Duration;
    use tracing::{info, warn};
    use tracing_subscriber::{fmt, EnvFilter};

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,election_live=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let config = args.config();
    let mut dashboard = DashboardState::new();
    if args.mute {
        dashboard.toggle_mute();
    }

    info!(url = %config.url, muted = dashboard.muted, "Connecting to live feed");
    let mut client = LiveEventClient::spawn(&config, HttpEventSource::new());
    let mut updates = client.subscribe();

    let mut countdown = ScrapeCountdown::new(now_millis());
    let mut banner = None;
    let mut event_count = 0u64;
    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Live feed task stopped");
                    break;
                }
                let state = updates.borrow_and_update().clone();
                let now = now_millis();
                let seen = state.last_event.as_ref().map_or(0, |e| e.sequence);
                if seen > event_count {
                    event_count = seen;
                    if let Some(event) = &state.last_event {
                        info!(event = %event.event, payload = %event.to_json(), "Live event");
                    }
                }
                for reaction in dashboard.observe(&state, now) {
                    match reaction {
                        Reaction::Revalidate => {
                            countdown.reset(now);
                            info!("Fresh results available, revalidating dashboard data");
                        }
                        Reaction::Chime(chime) => {
                            info!(
                                ?chime,
                                tone_hz = chime.frequency_hz(),
                                duration_ms = CHIME_DURATION.as_millis() as u64,
                                gain = CHIME_GAIN,
                                "Alert chime"
                            );
                        }
                    }
                }
                let next_banner = dashboard.banner();
                if next_banner != banner {
                    match next_banner {
                        Some(b) => warn!(retry_count = state.retry_count, "{}", b.message()),
                        None => info!("Live feed connected"),
                    }
                    banner = next_banner;
                }
            }
            _ = stats_interval.tick() => {
                if countdown.tick(now_millis()) {
                    info!("Scrape cycle elapsed");
                }
                let state = client.state();
                info!(
                    connected = state.connected,
                    phase = ?state.phase,
                    retries = state.retry_count,
                    events = event_count,
                    next_scrape = %countdown.display(),
                    last_update = ?dashboard.last_data_update,
                    "stats"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing live feed");
                break;
            }
        }
    }

    client.close();
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use turnstile::prelude::*;

type Gate = Turnstile<MemoryIdentityStore>;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Push a crowd of simulated clients through a Turnstile and watch them
/// queue, get admitted, heartbeat and leave.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Number of simulated clients
    #[arg(short, long, default_value_t = 25)]
    clients: usize,

    /// Every Nth client stops polling once queued and gets evicted (0 = none)
    #[arg(long, default_value_t = 7)]
    drop_every: usize,

    /// Seconds an admitted client stays inside before disconnecting
    #[arg(long, default_value_t = 3)]
    session_secs: u64,

    /// Stop the simulation after this many seconds
    #[arg(long, default_value_t = 60)]
    deadline_secs: u64,

    /// JSON config file (the flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tickets admitted per drain tick
    #[arg(long)]
    prefetch: Option<usize>,

    /// Milliseconds between drain ticks
    #[arg(long)]
    drain_interval_ms: Option<u64>,

    /// Maximum identities inside at once
    #[arg(long)]
    max_concurrent: Option<usize>,
}

/// Starting point when no config file is given: small and fast enough to
/// watch in a terminal.
fn demo_config() -> TurnstileConfig {
    TurnstileConfig {
        admission: AdmissionConfig {
            prefetch: 3,
            drain_interval_ms: 500,
            eviction_timeout_ms: 3_000,
            reaper_interval_ms: 500,
            ..Default::default()
        },
        presence: PresenceConfig {
            analyzer_interval_ms: 1_000,
            heartbeat_timeout_secs: 5,
            max_concurrent_identities: 8,
        },
    }
}

fn build_config(args: &Args) -> Result<TurnstileConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => demo_config(),
    };
    if let Some(prefetch) = args.prefetch {
        config.admission.prefetch = prefetch;
    }
    if let Some(ms) = args.drain_interval_ms {
        config.admission.drain_interval_ms = ms;
    }
    if let Some(max) = args.max_concurrent {
        config.presence.max_concurrent_identities = max;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Simulated client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Got in, stayed for its session, left.
    Served,
    /// Lost its ticket before being admitted.
    Evicted,
    /// Turned away by the gate.
    Rejected,
    /// Timed out by the presence analyzer while inside.
    Dropped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Summary {
    served: usize,
    evicted: usize,
    rejected: usize,
    dropped: usize,
    unfinished: usize,
}

impl Summary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Served => self.served += 1,
            Outcome::Evicted => self.evicted += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Dropped => self.dropped += 1,
        }
    }
}

async fn run_client(
    gate: Arc<Gate>,
    identity: Identity,
    stops_polling: bool,
    silence: Duration,
    session: Duration,
) -> Outcome {
    let request = LoginRequest::new(identity.clone(), format!("sig-{identity}"));
    if let Err(e) = gate.request_login(request) {
        warn!(%identity, error = %e, "login request rejected");
        return Outcome::Rejected;
    }

    loop {
        let status = gate.login_status(&identity);
        match status.state {
            LoginState::Logged => break,
            LoginState::Unknown => {
                info!(%identity, "ticket lost");
                return Outcome::Evicted;
            }
            LoginState::Waiting => {
                debug!(%identity, position = ?status.position, total = status.total, "waiting");
            }
        }
        if stops_polling {
            sleep(silence + RETRY_INTERVAL * 2).await;
        } else {
            sleep(POLL_INTERVAL).await;
        }
    }

    loop {
        match gate.enter(&identity) {
            Ok(()) => break,
            Err(TurnstileError::Presence(PresenceError::AtCapacity { .. })) => {
                sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                warn!(%identity, error = %e, "entry denied");
                return Outcome::Rejected;
            }
        }
    }

    let mut inside = Duration::ZERO;
    while inside < session {
        sleep(HEARTBEAT_INTERVAL).await;
        if let Err(e) = gate.heartbeat(&identity) {
            warn!(%identity, error = %e, "dropped while inside");
            return Outcome::Dropped;
        }
        inside += HEARTBEAT_INTERVAL;
    }
    if let Err(e) = gate.disconnect(&identity).await {
        warn!(%identity, error = %e, "logout failed");
    }
    Outcome::Served
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

async fn simulate(args: &Args) -> Result<Summary, TurnstileError> {
    let config = build_config(args)?;
    let silence = Duration::from_millis(config.admission.eviction_timeout_ms);
    let session = Duration::from_secs(args.session_secs);

    let store = Arc::new(MemoryIdentityStore::new());
    let gate = Arc::new(TurnstileBuilder::new().config(config).build(store).await);

    let mut clients = JoinSet::new();
    for n in 0..args.clients {
        let identity = Identity::new(format!("client-{n:03}"))?;
        let stops_polling = args.drop_every > 0 && (n + 1) % args.drop_every == 0;
        clients.spawn(run_client(
            Arc::clone(&gate),
            identity,
            stops_polling,
            silence,
            session,
        ));
    }

    let deadline = sleep(Duration::from_secs(args.deadline_secs));
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval(Duration::from_secs(1));
    let mut summary = Summary::default();

    loop {
        tokio::select! {
            joined = clients.join_next() => match joined {
                Some(Ok(outcome)) => summary.record(outcome),
                Some(Err(e)) => warn!(error = %e, "client task failed"),
                None => break,
            },
            _ = progress.tick() => {
                info!(
                    queued = gate.admission().queue_len(),
                    connected = gate.connected_count(),
                    max = gate.max_capacity(),
                    "progress"
                );
            }
            _ = &mut deadline => {
                summary.unfinished = clients.len();
                warn!(unfinished = summary.unfinished, "deadline reached, stopping clients");
                clients.abort_all();
                while clients.join_next().await.is_some() {}
                break;
            }
        }
    }

    match Arc::try_unwrap(gate) {
        Ok(gate) => gate.shutdown().await,
        Err(_) => warn!("gate still shared, background loops left running"),
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    info!(clients = args.clients, drop_every = args.drop_every, "starting simulation");

    let summary = simulate(&args).await?;
    info!(
        served = summary.served,
        evicted = summary.evicted,
        rejected = summary.rejected,
        dropped = summary.dropped,
        unfinished = summary.unfinished,
        "simulation finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["queue-sim"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_build_config_flags_override_demo_defaults() {
        let config = build_config(&args(&["--prefetch", "9", "--max-concurrent", "2"])).unwrap();
        assert_eq!(config.admission.prefetch, 9);
        assert_eq!(config.admission.drain_interval_ms, 500);
        assert_eq!(config.presence.max_concurrent_identities, 2);
    }

    #[test]
    fn test_build_config_missing_file_is_an_error() {
        let result = build_config(&args(&["--config", "/no/such/turnstile.json"]));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_everyone_polling_is_served() {
        let summary = simulate(&args(&["--clients", "10", "--drop-every", "0"]))
            .await
            .unwrap();

        assert_eq!(
            summary,
            Summary {
                served: 10,
                ..Default::default()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_silent_clients_are_evicted() {
        // Client 3 stops polling; prefetch 1 keeps it queued long enough.
        let summary = simulate(&args(&[
            "--clients",
            "6",
            "--drop-every",
            "3",
            "--prefetch",
            "1",
            "--drain-interval-ms",
            "2000",
        ]))
        .await
        .unwrap();

        assert!(summary.evicted >= 1);
        assert_eq!(summary.served + summary.evicted, 6);
        assert_eq!(summary.unfinished, 0);
    }
}

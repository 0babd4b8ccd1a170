mod config;
mod engine;
mod fault;
mod persist;
mod pump;
mod sensor;
mod stage;
mod store;
mod web;

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use config::SensorMode;
use engine::{now_epoch_ms, Engine, SharedEngine};
use persist::DataDir;
use pump::{PumpActuator, Relay};
use sensor::{DhtSensor, RetryPolicy, SensorAcquisition, SensorSource, SimulatedSensor};

/// Driver tick granularity; auto-off and cycle-due checks run at this rate.
const TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;

    // Persistence must be available, or nothing the user changes would
    // survive a restart; refuse to start without it.
    let data = DataDir::open(&cfg.data_dir)?;

    // ── Engine ──────────────────────────────────────────────────────
    let source: Box<dyn SensorSource> = match cfg.sensor {
        SensorMode::Simulated => Box::new(SimulatedSensor::new()),
        SensorMode::Hardware => Box::new(DhtSensor::new(cfg.dht_pin as u8)?),
    };
    let sensor = SensorAcquisition::new(source, RetryPolicy::default());
    let pump = PumpActuator::new(Relay::new(cfg.pump_pin as u8, cfg.relay_active_low)?);

    let engine = Engine::bootstrap(&cfg, data, sensor, pump, now_epoch_ms());
    tracing::info!(
        sensor = ?cfg.sensor,
        interval_hours = engine.interval_hours(),
        "green-nanny started"
    );
    let engine: SharedEngine = Arc::new(Mutex::new(engine));

    // ── Web server ──────────────────────────────────────────────────
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.web_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {}", cfg.web_port))?;
    tracing::info!(%addr, "api listening");

    tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            if let Err(e) = axum::serve(listener, web::router(engine)).await {
                tracing::error!("web server error: {e}");
            }
        }
    });

    // ── Driver loop ─────────────────────────────────────────────────
    let diagnostics_period = Duration::from_secs(cfg.diagnostics_min * 60);
    let mut last_diagnostics = Instant::now();
    let mut ticker = tokio::time::interval(TICK);

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let now_ms = now_epoch_ms();

        let mut eng = engine.lock().await;
        eng.poll_auto_off(now);
        if eng.cycle_due(now_ms) {
            eng.run_cycle(now_ms, now).await;
        }

        if last_diagnostics.elapsed() >= diagnostics_period {
            last_diagnostics = Instant::now();
            diagnostics(&eng, now_ms, now);
        }
    }
}

/// Periodic health line: enough to tell from the log alone whether the
/// controller is alive, watering, and on schedule.
fn diagnostics(engine: &Engine, now_ms: i64, now: Instant) {
    let status = engine.status(now_ms, now);
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    tracing::info!(
        uptime_secs = status.uptime_secs,
        stage = %status.stage.name,
        elapsed_days = status.stage.elapsed_days,
        pump_running = status.pump.running,
        activations = status.pump.activations,
        next_due_in_secs = (status.next_due_ms - now_ms) / 1000,
        history = status.history_len,
        free_mem_kb = sys.available_memory() / 1024,
        "diagnostics"
    );
}

mod poller;
mod status;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vocaluxe_proto::client::VocaluxeClient;
use vocaluxe_proto::config::Config;
use vocaluxe_proto::history::HistoryLog;

use poller::Poller;
use status::TerminalStatus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The terminal belongs to the status line, so tracing goes to a file.
    let data_dir = vocaluxe_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = vocaluxe_proto::platform::log_file();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vocaluxe_history=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let history = HistoryLog::new(&config.history.output_dir);
    let today = history.prepare(Local::now()).await?;
    match HistoryLog::load_entries(&today) {
        Ok(entries) => info!("History file: {:?} ({} songs already recorded)", today, entries.len()),
        Err(e) => warn!("History file: {:?} (cannot read existing entries: {})", today, e),
    }

    let client = VocaluxeClient::from_config(&config.server)?;
    info!("Polling Vocaluxe at {}", client.base_url());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                ctrl_c.cancel();
            }
            // keep polling; the process can still be killed
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let mut term = TerminalStatus::stdout();
    let mut poller = Poller::new(client, history, config.poll.interval());
    let result = poller.run(&mut term, cancel).await;
    term.finish();

    let state = poller.state();
    if !state.last_logged().is_none() {
        info!("Last recorded: {} - {}", state.last_logged().artist, state.last_logged().title);
    }
    if state.is_timed_out() {
        warn!("Stopped while the Vocaluxe server was unreachable");
    }
    result
}

//! Tail a gateway session
//!
//! Connects with the configured token, logs every configured event and
//! every error until Ctrl+C or a fatal error.
//!
//! Usage: `gateway_tail [settings.yaml]`

use anyhow::Result;
use gatelink::events::handler;
use gatelink::{GatewayError, TracingDebugger};
use gatelink_tools::bin_common::{init_tracing, load_config_from_env, parse_args, ConfigType, Settings};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let path = match parse_args().into_iter().next() {
        Some(path) => load_config_from_env(ConfigType::Custom(path)),
        None => load_config_from_env(ConfigType::Gateway),
    };
    let settings = Settings::load(&path)?.with_overrides(|name| std::env::var(name).ok())?;

    let client = settings
        .client_builder()?
        .debugger(TracingDebugger)
        .build()
        .await?;

    for event in &settings.events {
        let name = event.clone();
        client.on(handler(event.as_str(), move |data| {
            info!(event = %name, "{}", data);
            Ok(())
        }));
    }

    // the error stream is a blocking crossbeam channel; watch it from a thread
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let errors = client.errors();
    std::thread::spawn(move || {
        while let Ok(err) = errors.recv() {
            match err {
                GatewayError::Fatal(_) => {
                    error!(error = %err, "Gateway session ended");
                    let _ = fatal_tx.send(err);
                }
                GatewayError::Disruption(_) => warn!(error = %err, "Gateway disrupted"),
                other => warn!(error = %other, "Gateway error"),
            }
        }
    });

    info!("Tailing gateway events, press Ctrl+C to stop");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
        Some(err) = fatal_rx.recv() => Err(err),
    };

    client.close()?;
    let metrics = client.metrics();
    info!(
        received = metrics.messages_received,
        sent = metrics.messages_sent,
        heartbeats = metrics.heartbeats_sent,
        reconnects = metrics.reconnect_count,
        "Gateway tail stopped"
    );

    outcome.map_err(anyhow::Error::from)
}

//! Stream live quotes for the symbols given on the command line
//!
//! ```text
//! stream_quotes AAPL MSFT TSLA
//! ```
//!
//! Reads `STREAM_CONFIG_PATH` (default `config/stream.yaml`), and
//! `MARKET_STREAM_KEY` / `MARKET_STREAM_SECRET` for the upstream auth frame.

use anyhow::Result;
use dashboard_stream::bin_common::{init_tracing, load_stream_config, parse_args, ConfigType};
use dashboard_stream::marketstream::{
    AlpacaCodec, InitializeOptions, MarketDataService, StaticAuth, WebSocketTransport,
};
use std::sync::Arc;
use tracing::{error, info, warn};

const KEY_ENV_VAR: &str = "MARKET_STREAM_KEY";
const SECRET_ENV_VAR: &str = "MARKET_STREAM_SECRET";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv::dotenv().ok();
    init_tracing("info");

    let symbols = parse_args();
    if symbols.is_empty() {
        eprintln!("Usage: stream_quotes <SYMBOL> [SYMBOL...]");
        std::process::exit(1);
    }

    let config = load_stream_config(ConfigType::Stream)?;

    let mut transport = WebSocketTransport::new(config.url.clone());
    match (std::env::var(KEY_ENV_VAR), std::env::var(SECRET_ENV_VAR)) {
        (Ok(key), Ok(secret)) => {
            transport = transport.with_auth(Arc::new(StaticAuth::new(AlpacaCodec::auth_frame(
                &key, &secret,
            ))));
        }
        _ => warn!(
            "{} / {} not set, connecting without authentication",
            KEY_ENV_VAR, SECRET_ENV_VAR
        ),
    }

    let service = Arc::new(MarketDataService::new(
        Arc::new(transport),
        Arc::new(AlpacaCodec::new()),
        &config,
    ));

    service.add_connection_listener(|state| info!("Connection: {}", state));
    service.add_global_price_listener(|snapshot| {
        info!(
            "{:<6} {:>10.4}  bid {:?}  ask {:?}  last {:?}",
            snapshot.symbol, snapshot.price, snapshot.bid, snapshot.ask, snapshot.last_trade_price
        );
    });

    service.subscribe(&symbols);

    if let Err(e) = service
        .initialize(InitializeOptions { feed: config.feed })
        .await
    {
        error!("{}; still retrying in the background", e);
    }

    info!("Streaming {} symbols, press Ctrl+C to stop", symbols.len());
    tokio::signal::ctrl_c().await?;

    service.disconnect();
    for (symbol, snapshot) in service.get_all_prices() {
        let samples = service
            .get_price_history(&symbol)
            .map_or(0, |history| history.len());
        info!("{}: last {:.4} ({} samples)", symbol, snapshot.price, samples);
    }

    Ok(())
}

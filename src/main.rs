use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use futuresbot::strategy::{BreakoutParams, Strategy, StrategyKind, TechnicalParams};
use futuresbot::streams::{StreamConnection, StreamSpec};
use futuresbot::types::Timeframe;
use futuresbot::{BinanceFuturesClient, BitmexClient, ExchangeConnector, ExchangeHub};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Exchange to trade on
    #[arg(long, value_enum, default_value = "binance")]
    exchange: ExchangeArg,

    /// Contract symbol, e.g. BTCUSDT or XBTUSD
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    /// Candle timeframe
    #[arg(long, default_value = "1m")]
    timeframe: Timeframe,

    /// Strategy variant
    #[arg(long, value_enum, default_value = "technical")]
    strategy: StrategyArg,

    /// Percent of wallet balance committed per entry
    #[arg(long, default_value = "5.0")]
    balance_pct: f64,

    /// Take-profit threshold in percent of entry price
    #[arg(long, default_value = "2.0")]
    take_profit: f64,

    /// Stop-loss threshold in percent of entry price
    #[arg(long, default_value = "1.0")]
    stop_loss: f64,

    /// Fast EMA period (technical strategy)
    #[arg(long, default_value = "12")]
    ema_fast: usize,

    /// Slow EMA period (technical strategy)
    #[arg(long, default_value = "26")]
    ema_slow: usize,

    /// Signal EMA period (technical strategy)
    #[arg(long, default_value = "9")]
    ema_signal: usize,

    /// Minimum candle volume (breakout strategy)
    #[arg(long, default_value = "0.0")]
    min_volume: f64,

    /// Use the exchange's testnet
    #[arg(long)]
    testnet: bool,

    /// Seconds between presentation polls
    #[arg(long, default_value = "5")]
    poll_secs: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExchangeArg {
    Binance,
    Bitmex,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Technical,
    Breakout,
}

impl Args {
    fn strategy_kind(&self) -> StrategyKind {
        match self.strategy {
            StrategyArg::Technical => StrategyKind::Technical(TechnicalParams {
                ema_fast: self.ema_fast,
                ema_slow: self.ema_slow,
                ema_signal: self.ema_signal,
            }),
            StrategyArg::Breakout => StrategyKind::Breakout(BreakoutParams {
                min_volume: self.min_volume,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("futuresbot=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        exchange = ?args.exchange,
        symbol = %args.symbol,
        timeframe = %args.timeframe,
        strategy = ?args.strategy,
        testnet = args.testnet,
        "starting trading core"
    );

    match args.exchange {
        ExchangeArg::Binance => {
            let client = Arc::new(BinanceFuturesClient::from_env(args.testnet));
            let spec = client.stream_spec();
            run(client, spec, args).await
        }
        ExchangeArg::Bitmex => {
            let client = Arc::new(BitmexClient::from_env(args.testnet));
            let spec = client.stream_spec();
            run(client, spec, args).await
        }
    }
}

async fn run<S: StreamSpec>(
    connector: Arc<dyn ExchangeConnector>,
    spec: S,
    args: Args,
) -> Result<()> {
    let hub = Arc::new(ExchangeHub::connect(connector).await);
    let contract = hub
        .contract(&args.symbol)
        .with_context(|| format!("unknown symbol {}", args.symbol))?
        .clone();

    let strategy = Strategy::new(
        contract,
        args.timeframe,
        args.strategy_kind(),
        args.balance_pct,
        args.take_profit,
        args.stop_loss,
    );
    hub.add_strategy(strategy).await;

    let quote_channel = spec.quote_channel();
    let trade_channel = spec.trade_channel();
    let (event_tx, mut event_rx) = mpsc::channel(1024);
    let mut connection = StreamConnection::new(spec, event_tx);
    connection.subscribe(vec![args.symbol.clone()], quote_channel);
    connection.subscribe(vec![args.symbol.clone()], trade_channel);
    let stream = connection.handle();
    tokio::spawn(connection.run());

    let dispatch_hub = hub.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            dispatch_hub.handle_event(event).await;
        }
    });

    // Stand-in presentation loop: poll core state on a fixed period and
    // consume each log entry exactly once.
    let mut poll = tokio::time::interval(Duration::from_secs(args.poll_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                stream.shutdown();
                break;
            }
            _ = poll.tick() => {
                for line in hub.take_new_logs().await {
                    println!("{line}");
                }
                if let Some(quote) = hub.prices_snapshot().await.get(&args.symbol) {
                    println!(
                        "{} bid {} / ask {} ({:?})",
                        args.symbol, quote.bid, quote.ask, stream.state()
                    );
                }
                if !hub.balances_snapshot().await.is_empty() {
                    hub.refresh_balances().await;
                }
            }
        }
    }
    Ok(())
}

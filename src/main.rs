use std::path::PathBuf;

use anyhow::Context;
use bistbacktest::{backtest::Backtest, strategies::build_agent};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "backtest a strategy on a historical order stream", long_about = None)]
struct Args {
    /// Name/key of the strategy to use for backtesting.
    #[arg(long)]
    strategy: String,

    /// Path to the historical order data file.
    #[arg(long)]
    filepath: PathBuf,

    /// One-way latency between the network edge and the exchange, in seconds.
    #[arg(long, default_value_t = 0.0)]
    latency: f64,

    /// Fee charged per order the strategy submits.
    #[arg(long, default_value_t = 0.0)]
    order_cost: f64,

    /// Initial money of the agent.
    #[arg(long, default_value_t = 10000.0)]
    initial_money: f64,

    /// Initial stock of the agent.
    #[arg(long, default_value_t = 0)]
    initial_stock: i64,

    /// Price tick size of the asset.
    #[arg(long, default_value_t = 0.01)]
    tick_size: f64,

    /// Options passed to the strategy as key=value pairs.
    #[arg(long, num_args = 0..)]
    options: Vec<String>,

    /// Directory where backtest reports are persisted.
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let agent = build_agent(&args.strategy, &args.options)?;
    let mut backtest = Backtest::builder()
        .agent(agent)
        .file(&args.filepath)
        .latency(args.latency)
        .order_cost(args.order_cost)
        .initial_money(args.initial_money)
        .initial_stock(args.initial_stock)
        .tick_size(args.tick_size)
        .build()?;

    backtest.run()?;

    if args.strategy.eq_ignore_ascii_case("dummy") {
        // The no-op run is only good for the book itself: export it next to
        // the input.
        let mut output = args.filepath.with_file_name("limit-order-book");
        if let Some(extension) = args.filepath.extension() {
            output.set_extension(extension);
        }
        backtest
            .export_lob(&output)
            .context("failed to write the limit order book export")?;
        info!(path = %output.display(), "exported limit order book");
    } else {
        backtest
            .recorder()
            .save_report(backtest.balance(), &args.results_dir, &args.strategy)?;
    }

    Ok(())
}

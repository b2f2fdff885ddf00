// src/main.rs
use clap::Parser;
use rig_orchestrator_rs::{self, *};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Main entry point for the rig orchestrator
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(RigError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), RigError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Run(opts) => run_orchestrator(opts),
        cli::Action::Profit(opts) => show_profit(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Runs the orchestrator daemon until interrupted
///
/// # Arguments
/// * `opts` - Command line options for the daemon
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads and validates configuration
/// 3. Wires the production collaborators into the orchestrator
/// 4. Runs the sampler/watchdog/auto-switch loops until Ctrl-C
/// 5. Stops the miner and drains the loops on shutdown
fn run_orchestrator(opts: cli::RunOptions) -> Result<(), RigError> {
    utils::init_logging();

    let config = config::load(opts.config.clone())?;
    let config = Arc::new(arc_swap::ArcSwap::from_pointee(config));

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
    if let Some(url) = &config.load().notifications.discord_webhook {
        log::info!("Discord webhook notifications enabled");
        sinks.push(Arc::new(WebhookSink::new(url.clone())));
    }

    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        Arc::new(NvidiaSmiSensor),
        Arc::new(TokioLauncher),
        Arc::new(LoggingHardwareControl),
        Arc::new(CoinGeckoSource::new(Arc::clone(&config))),
        sinks,
    );

    let rt = Runtime::new()?;
    rt.block_on(async {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let runner = tokio::spawn(Arc::clone(&orchestrator).run(shutdown_rx));

        if let Some(coin) = opts.coin.as_deref() {
            if let Err(e) = orchestrator.start(Some(coin), None, None).await {
                log::error!("Initial start of {} failed: {}", coin, e);
            }
        }

        tokio::signal::ctrl_c().await?;
        log::info!("Shutdown signal received");

        match orchestrator.stop().await {
            Ok(()) | Err(RigError::NotRunning) => {}
            Err(e) => log::warn!("Stopping the miner on shutdown failed: {}", e),
        }
        let _ = shutdown_tx.send(true);
        let _ = runner.await;
        Ok(())
    })
}

/// Ranks the configured coins by estimated daily profit and exits
///
/// # Arguments
/// * `opts` - Profitability command options
///
/// # Operations
/// 1. Initializes verbose logging for the one-shot diagnostic
/// 2. Evaluates every configured coin against live prices
/// 3. Logs the ranked result
fn show_profit(opts: cli::ProfitOptions) -> Result<(), RigError> {
    utils::logging::init_verbose_logging();

    let config = config::load(opts.config)?;
    let cost = config.general.electricity_cost_per_kwh;
    let config = Arc::new(arc_swap::ArcSwap::from_pointee(config));
    let prices = Arc::new(CoinGeckoSource::new(Arc::clone(&config)));
    let evaluator = ProfitabilityEvaluator::new(config, prices);

    let rt = Runtime::new()?;
    let ranked = rt.block_on(evaluator.evaluate(cost))?;

    log::info!("Daily profit estimate at {:.2} USD/kWh:", cost);
    for record in &ranked {
        log::info!(
            "  {}: revenue {:.2} USD, electricity {:.2} USD, profit {:.2} USD",
            record.coin,
            record.daily_revenue_usd,
            record.daily_electricity_cost_usd,
            record.daily_profit_usd
        );
    }
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
///
/// # Operations
/// 1. Generates the template content
/// 2. Writes the template to the specified output file
fn generate_config(opts: cli::ConfigOptions) -> Result<(), RigError> {
    let config = config::generate_template();
    std::fs::write(opts.output, config)?;
    Ok(())
}

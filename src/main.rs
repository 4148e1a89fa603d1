//! duoroute CLI
//!
//! Loads configuration, wires the primary and secondary backends into a
//! failover router and runs the invocation driver, printing one line per
//! invocation.

use clap::Parser;
use duoroute::{
    backend::{Backend, FaultInjectingBackend, HttpBackend, ScriptedBackend, ScriptedOutcome},
    cli::{Cli, Command, RunArgs, generate_config_template},
    config::Config,
    driver::{DriverConfig, InvocationDriver},
    metrics::Metrics,
    router::FailoverRouter,
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config { output } => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Wrote configuration template to {}", path);
                }
                None => print!("{}", template),
            }
            Ok(())
        }
        Command::Run(args) => run(&cli.config, args).await,
    }
}

async fn run(config_path: &str, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_file(config_path)?;
    if let Some(model) = &args.primary_model {
        config.primary = config.primary.with_model(model.clone());
        config.validate()?;
    }

    telemetry::init(&config.observability.log_level);

    let (primary_endpoint, secondary_endpoint) = config.endpoints()?;

    let (primary, secondary): (Arc<dyn Backend>, Arc<dyn Backend>) = if args.simulate {
        tracing::info!("Simulation mode: using in-process echo backends");
        (
            Arc::new(
                ScriptedBackend::always(primary_endpoint, ScriptedOutcome::Echo)
                    .without_recording(),
            ),
            Arc::new(
                ScriptedBackend::always(secondary_endpoint, ScriptedOutcome::Echo)
                    .without_recording(),
            ),
        )
    } else {
        let api_key = config.backend.api_key();
        (
            Arc::new(HttpBackend::new(primary_endpoint, api_key.clone())?),
            Arc::new(HttpBackend::new(secondary_endpoint, api_key)?),
        )
    };

    let plan = args.throttle_plan();
    tracing::info!(plan = ?plan, "Simulated throttling plan");
    let primary: Arc<dyn Backend> = Arc::new(FaultInjectingBackend::new(primary, plan));

    let metrics = Arc::new(Metrics::new()?);
    let router = FailoverRouter::new(primary, secondary)
        .with_deadline(config.backend.timeout())
        .with_metrics(metrics.clone());

    let driver = InvocationDriver::new(
        router,
        DriverConfig::new(args.iterations, args.concurrency)?,
    );

    let reports = driver.run(&args.prompt, &config.generation).await?;

    let mut failures = 0;
    for report in &reports {
        match &report.result {
            Ok(response) => println!(
                "[{}] {} (fell back: {}): {}",
                report.iteration,
                response.source.label(),
                response.decision.fell_back,
                response.completion
            ),
            Err(error) => {
                failures += 1;
                println!("[{}] error: {}", report.iteration, error);
            }
        }
    }

    if args.metrics {
        print!("{}", metrics.gather()?);
    }

    tracing::info!(
        invocations = reports.len(),
        failures,
        fallbacks = metrics.fallbacks_count(),
        "Run finished"
    );

    Ok(())
}

//! Command-line interface for duoroute
//!
//! Provides argument parsing and subcommand handling for the duoroute binary.

use crate::backend::ThrottlePlan;
use clap::{Args, Parser, Subcommand};

/// Primary/secondary failover router for hosted LLM inference endpoints
#[derive(Parser)]
#[command(name = "duoroute")]
#[command(version)]
#[command(about = "Primary/secondary failover router for hosted LLM inference endpoints")]
#[command(
    long_about = "duoroute sends each inference request to a primary endpoint (typically \
    provisioned capacity) and retries it once on a secondary endpoint when the primary \
    reports throttling."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Route a prompt repeatedly, optionally simulating throttling
    Run(RunArgs),

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Prompt to send
    pub prompt: String,

    /// Override the primary endpoint's model (e.g. a provisioned-throughput ARN)
    #[arg(long)]
    pub primary_model: Option<String>,

    /// Number of invocations
    #[arg(short = 'n', long, default_value_t = crate::driver::DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Maximum invocations in flight at once
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Throttle these zero-based primary attempts (comma-separated)
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["throttle_from", "throttle_rate"])]
    pub throttle_at: Vec<usize>,

    /// Throttle every primary attempt from this index on
    #[arg(long, conflicts_with = "throttle_rate")]
    pub throttle_from: Option<usize>,

    /// Throttle each primary attempt with this probability (0.0-1.0)
    #[arg(long, value_parser = parse_throttle_rate)]
    pub throttle_rate: Option<f64>,

    /// Seed for --throttle-rate
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Use in-process echo backends instead of the configured HTTP endpoints
    #[arg(long)]
    pub simulate: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

/// Parse a probability in `[0.0, 1.0]`, rejecting NaN
fn parse_throttle_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value
        .parse()
        .map_err(|e| format!("'{}' is not a number: {}", value, e))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(format!("must be between 0.0 and 1.0, got {}", value));
    }
    Ok(rate)
}

impl RunArgs {
    /// Throttle plan selected by the flags
    pub fn throttle_plan(&self) -> ThrottlePlan {
        if let Some(rate) = self.throttle_rate {
            ThrottlePlan::Random {
                rate,
                seed: self.seed,
            }
        } else if let Some(start) = self.throttle_from {
            ThrottlePlan::From(start)
        } else if !self.throttle_at.is_empty() {
            ThrottlePlan::at(self.throttle_at.iter().copied())
        } else {
            ThrottlePlan::Never
        }
    }
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# duoroute Configuration
# =======================

# ─────────────────────────────────────────────────────────────────────────────
# ENDPOINTS
# ─────────────────────────────────────────────────────────────────────────────
#
# Every request goes to the primary first. Only when the primary reports
# throttling (rate or capacity limit) is the request sent, once, to the
# secondary. Any other primary failure is returned as-is.
#
# Endpoint fields:
#   - locality: region code (must be a known region, e.g. "us-east-1")
#   - model: model id or provisioned-throughput ARN
#   - base_url: optional; defaults to https://bedrock-runtime.<locality>.amazonaws.com

[primary]
locality = "us-east-1"
model = "arn:aws:bedrock:us-east-1:123456789012:provisioned-model/your-model-id"

[secondary]
locality = "us-west-2"
model = "anthropic.claude-v2"

# ─────────────────────────────────────────────────────────────────────────────
# GENERATION
# ─────────────────────────────────────────────────────────────────────────────

[generation]
max_tokens = 300
# Sampling temperature (0.0-1.0)
temperature = 0.5
stop_sequences = ["\n\nHuman:"]

# ─────────────────────────────────────────────────────────────────────────────
# BACKEND
# ─────────────────────────────────────────────────────────────────────────────

[backend]
# Per-call deadline in seconds (1-300). Expiry counts as unavailable.
timeout_seconds = 30

# Environment variable holding a bearer token (optional)
# api_key_env = "AWS_BEARER_TOKEN_BEDROCK"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["duoroute", "run", "ping"]);
        assert_eq!(cli.config, "config.toml");
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.prompt, "ping");
        assert_eq!(args.iterations, 10);
        assert_eq!(args.concurrency, 1);
        assert!(args.primary_model.is_none());
        assert!(!args.simulate);
        assert_eq!(args.throttle_plan(), ThrottlePlan::Never);
    }

    #[test]
    fn run_with_primary_model_and_custom_config() {
        let cli = Cli::parse_from([
            "duoroute",
            "--config",
            "custom.toml",
            "run",
            "hello",
            "--primary-model",
            "arn:aws:bedrock:us-east-1:1:provisioned-model/x",
        ]);
        assert_eq!(cli.config, "custom.toml");
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(
            args.primary_model.as_deref(),
            Some("arn:aws:bedrock:us-east-1:1:provisioned-model/x")
        );
    }

    #[test]
    fn throttle_at_parses_comma_list() {
        let cli = Cli::parse_from(["duoroute", "run", "p", "--throttle-at", "2,5"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.throttle_plan(), ThrottlePlan::at([2, 5]));
    }

    #[test]
    fn throttle_from_and_rate() {
        let cli = Cli::parse_from(["duoroute", "run", "p", "--throttle-from", "5"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.throttle_plan(), ThrottlePlan::From(5));

        let cli = Cli::parse_from([
            "duoroute",
            "run",
            "p",
            "--throttle-rate",
            "0.25",
            "--seed",
            "9",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(
            args.throttle_plan(),
            ThrottlePlan::Random {
                rate: 0.25,
                seed: 9
            }
        );
    }

    #[test]
    fn throttle_rate_out_of_range_is_rejected() {
        for value in ["1.5", "-0.1", "NaN", "inf", "abc"] {
            let result = Cli::try_parse_from(["duoroute", "run", "p", "--throttle-rate", value]);
            assert!(result.is_err(), "--throttle-rate {value} should be rejected");
        }
        for value in ["0", "0.0", "1", "1.0"] {
            let result = Cli::try_parse_from(["duoroute", "run", "p", "--throttle-rate", value]);
            assert!(result.is_ok(), "--throttle-rate {value} should be accepted");
        }
    }

    #[test]
    fn conflicting_throttle_flags_are_rejected() {
        let result = Cli::try_parse_from([
            "duoroute",
            "run",
            "p",
            "--throttle-at",
            "1",
            "--throttle-from",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["duoroute", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config { output: Some(ref path) } if path == "my-config.toml"
        ));
    }

    #[test]
    fn template_is_valid_toml() {
        let result: Result<toml::Value, _> = toml::from_str(generate_config_template());
        assert!(
            result.is_ok(),
            "Template should be valid TOML: {:?}",
            result.err()
        );
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[primary]"));
        assert!(template.contains("[secondary]"));
        assert!(template.contains("[generation]"));
        assert!(template.contains("[backend]"));
        assert!(template.contains("[observability]"));
    }
}

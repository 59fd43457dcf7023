//! Learned-terminal-cost MPC command-line driver.
//!
//! Each pipeline stage is a subcommand, so stages can be run separately and
//! chained through JSON files:
//! - `sample`: solve bare OCPs from random initial states, write the samples
//! - `train`: fit the quadratic terminal cost model to a sample file
//! - `control`: run the receding-horizon loop with a trained model
//! - `run`: all three stages in one process
//! - `info`: print the effective configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lcmpc_core::prelude::*;
use lcmpc_mpc::Pipeline;
use lcmpc_surrogate::{QuadraticCostModel, QuadraticRegressor, SampleSet, TerminalCostModel, rmse};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Learned-terminal-cost MPC for a torque-limited double pendulum.
#[derive(Parser)]
#[command(name = "lcmpc", version, about)]
struct Cli {
    /// TOML configuration file. Missing sections use defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate training samples.
    Sample {
        /// Output sample file.
        #[arg(short, long, default_value = "samples.json")]
        out: PathBuf,

        /// Override `sampler.num_samples`.
        #[arg(short = 'n', long)]
        num_samples: Option<usize>,

        /// Override `sampler.seed`.
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Fit a terminal cost model to a sample file.
    Train {
        /// Input sample file.
        #[arg(short, long, default_value = "samples.json")]
        samples: PathBuf,

        /// Output model file.
        #[arg(short, long, default_value = "model.json")]
        out: PathBuf,
    },

    /// Run the MPC loop with a trained model.
    Control {
        /// Input model file.
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,

        /// Initial state `q1,q2,dq1,dq2`.
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        x0: Option<Vec<f64>>,

        /// Override `mpc.steps`.
        #[arg(long)]
        steps: Option<usize>,

        /// Write the run summary here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Sample, train and control in one go.
    Run {
        /// Initial state `q1,q2,dq1,dq2`.
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        x0: Option<Vec<f64>>,

        /// Write the run summary here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the effective configuration.
    Info,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DEFAULT_X0: [f64; STATE_DIM] = [0.5, -0.5, 0.0, 0.0];

fn load_config(path: Option<&Path>) -> Result<LcmpcConfig> {
    match path {
        Some(path) => LcmpcConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(LcmpcConfig::default()),
    }
}

fn parse_state(values: Option<&[f64]>) -> Result<State> {
    let values = values.unwrap_or(&DEFAULT_X0);
    if values.len() != STATE_DIM {
        bail!(
            "initial state needs {STATE_DIM} comma-separated values, got {}",
            values.len()
        );
    }
    if !values.iter().all(|v| v.is_finite()) {
        bail!("initial state must be finite");
    }
    Ok(State::from_column_slice(values))
}

fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_sample(
    mut config: LcmpcConfig,
    out: &Path,
    num_samples: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(n) = num_samples {
        config.sampler.num_samples = n;
    }
    if let Some(seed) = seed {
        config.sampler.seed = seed;
    }
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.generate_samples()?;
    println!(
        "samples: attempted={}, succeeded={}, skipped={}",
        report.attempted(),
        report.succeeded(),
        report.skipped()
    );
    report
        .into_sample_set()
        .save_json(out)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn run_train(config: LcmpcConfig, samples: &Path, out: &Path) -> Result<()> {
    let trainer = QuadraticRegressor::from_config(&config.surrogate);
    let pipeline = Pipeline::new(config)?;
    let samples = SampleSet::load_json(samples)
        .with_context(|| format!("reading {}", samples.display()))?;
    let model = pipeline.train_samples(&samples, &trainer)?;
    if let Some(mean) = samples.mean_cost() {
        println!(
            "trained on {} samples (mean cost {mean:.4}, rmse {:.4})",
            samples.len(),
            rmse(&model, &samples)
        );
    }
    model
        .save_json(out)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn run_control(
    mut config: LcmpcConfig,
    model: &Path,
    x0: Option<&[f64]>,
    steps: Option<usize>,
    out: Option<&Path>,
) -> Result<()> {
    if let Some(steps) = steps {
        config.mpc.steps = steps;
    }
    let dt = config.dynamics.dt;
    let pipeline = Pipeline::new(config)?;
    let model: Arc<dyn TerminalCostModel> = Arc::new(
        QuadraticCostModel::load_json(model)
            .with_context(|| format!("reading {}", model.display()))?,
    );
    let run = pipeline.control(parse_state(x0)?, model)?;
    write_json(&run.summary(dt), out)
}

fn run_all(config: LcmpcConfig, x0: Option<&[f64]>, out: Option<&Path>) -> Result<()> {
    let trainer = QuadraticRegressor::from_config(&config.surrogate);
    let dt = config.dynamics.dt;
    let pipeline = Pipeline::new(config)?;
    let outcome = pipeline.run(parse_state(x0)?, &trainer)?;
    info!(
        attempted = outcome.report.attempted(),
        succeeded = outcome.report.succeeded(),
        model = outcome.model.name(),
        "pipeline finished"
    );
    write_json(&outcome.run.summary(dt), out)
}

fn run_info(config: &LcmpcConfig) -> Result<()> {
    println!("lcmpc v{}", env!("CARGO_PKG_VERSION"));
    println!();
    write_json(config, None)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sample {
            out,
            num_samples,
            seed,
        } => run_sample(config, &out, num_samples, seed),
        Commands::Train { samples, out } => run_train(config, &samples, &out),
        Commands::Control {
            model,
            x0,
            steps,
            out,
        } => run_control(config, &model, x0.as_deref(), steps, out.as_deref()),
        Commands::Run { x0, out } => run_all(config, x0.as_deref(), out.as_deref()),
        Commands::Info => run_info(&config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_control() {
        let args = [
            "lcmpc",
            "control",
            "--model",
            "m.json",
            "--x0",
            "0.1,-0.2,0,0",
            "--steps",
            "3",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Control { x0, steps, .. } = cli.command else {
            panic!("expected control");
        };
        assert_eq!(x0.unwrap(), vec![0.1, -0.2, 0.0, 0.0]);
        assert_eq!(steps, Some(3));
    }

    #[test]
    fn state_parsing() {
        assert_eq!(
            parse_state(None).unwrap(),
            State::from_column_slice(&DEFAULT_X0)
        );
        assert!(parse_state(Some(&[1.0, 2.0][..])).is_err());
        assert!(parse_state(Some(&[f64::NAN, 0.0, 0.0, 0.0][..])).is_err());
    }

    #[test]
    fn missing_config_flag_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), LcmpcConfig::default());
        assert!(load_config(Some(Path::new("/nonexistent/lcmpc.toml"))).is_err());
    }
}

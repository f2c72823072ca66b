mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analysis::AnalyzeArgs;
use commands::analytics::MetricsArgs;
use commands::market::EstimateArgs;
use commands::optimization::{FrontierArgs, OptimizeArgs};
use commands::sampling::{MatchReturnArgs, SampleArgs};
use commands::simulation::SimulateArgs;

/// Mean-variance portfolio construction and analysis
#[derive(Parser)]
#[command(
    name = "pfa",
    version,
    about = "Mean-variance portfolio construction and analysis",
    long_about = "A CLI for constructing and analysing mean-variance efficient portfolios. \
                  Supports constrained optimization, efficient frontier generation, random \
                  portfolio sampling, return matching, market estimation from price history, \
                  and geometric Brownian motion simulation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve for the minimum-variance portfolio at a target return
    Optimize(OptimizeArgs),
    /// Trace the efficient frontier over a grid of target returns
    Frontier(FrontierArgs),
    /// Compute return, risk and Sharpe ratio for given weights
    Metrics(MetricsArgs),
    /// Sample random long-only portfolios
    Sample(SampleArgs),
    /// Search random portfolios for one matching a target return
    MatchReturn(MatchReturnArgs),
    /// Simulate portfolio value paths under geometric Brownian motion
    Simulate(SimulateArgs),
    /// Estimate annualized returns and covariance from price history
    Estimate(EstimateArgs),
    /// Run the full pipeline: estimate, optimize, frontier, sample, simulate
    Analyze(AnalyzeArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimization::run_optimize(args),
        Commands::Frontier(args) => commands::optimization::run_frontier(args),
        Commands::Metrics(args) => commands::analytics::run_metrics(args),
        Commands::Sample(args) => commands::sampling::run_sample(args),
        Commands::MatchReturn(args) => commands::sampling::run_match_return(args),
        Commands::Simulate(args) => commands::simulation::run_simulate(args),
        Commands::Estimate(args) => commands::market::run_estimate(args),
        Commands::Analyze(args) => commands::analysis::run_analyze(args),
        Commands::Version => {
            println!("pfa {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

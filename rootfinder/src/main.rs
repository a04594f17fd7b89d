//! rootfind - Newton-Raphson on the reference functions
//!
//! Derivatives come from the adjoint tape, or from the closed form with
//! `--analytic`. Several starting points are solved in parallel.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rootfinder::{NewtonSolver, Result, TestFunction, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

#[derive(Parser)]
#[command(name = "rootfind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Function to solve
    #[arg(short, long, value_enum, default_value_t = TestFunction::Cubic)]
    function: TestFunction,

    /// Starting points (defaults to the function's usual start)
    #[arg(short = 'x', long, num_args = 1.., allow_hyphen_values = true)]
    x0: Vec<f64>,

    /// Stop once the Newton step is smaller than this
    #[arg(short, long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Iteration cap per starting point
    #[arg(short, long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Use the closed-form derivative instead of the tape
    #[arg(long)]
    analytic: bool,

    /// Log every iteration
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let f = cli.function;
    let starts = if cli.x0.is_empty() {
        vec![f.default_start()]
    } else {
        cli.x0
    };
    let solver = NewtonSolver::new()
        .with_tolerance(cli.tolerance)
        .with_max_iterations(cli.max_iterations);
    info!(function = ?f, starts = starts.len(), analytic = cli.analytic, "solving");

    let results = if cli.analytic {
        starts
            .iter()
            .map(|&x0| solver.solve_with_derivative(|x| f.eval(x), |x| f.derivative(x), x0))
            .collect::<Vec<_>>()
    } else {
        solver.solve_many(|x| f.eval(x), &starts)
    };

    let mut last_error = None;
    let mut solved = 0;
    for (x0, result) in starts.iter().zip(results) {
        match result {
            Ok(s) => {
                solved += 1;
                println!(
                    "x0 = {:>12.6}  root = {:.10}  iterations = {}",
                    x0, s.root, s.iterations
                );
            }
            Err(e) => {
                error!(x0, "{}", e);
                println!("x0 = {:>12.6}  failed: {}", x0, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if solved == 0 => Err(e),
        _ => Ok(()),
    }
}

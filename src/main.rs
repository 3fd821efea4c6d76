use std::{process::ExitCode, time::Instant};

use lbp_denoise::{construct_graph, run, BPError, EngineOptions, Image, PredictionType, SchedulerType};
use log::{error, info};
use rand_xoshiro::{rand_core::SeedableRng, Xoshiro256PlusPlus};

const ROWS: usize = 100;
const COLS: usize = 100;
const COLORS: usize = 5;
const SIGMA: f64 = 1.;
const LAMBDA: f64 = 2.;
const SMOOTHING: &str = "laplace";
const SEED: u64 = 0;

fn denoise() -> Result<(), BPError> {
    // Create synthetic images
    info!("Creating a synthetic {}x{} image with {} colors.", ROWS, COLS, COLORS);
    let mut original = Image::new(ROWS, COLS);
    original.paint_sunset(COLORS);

    info!("Corrupting image with noise of standard deviation {}.", SIGMA);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(SEED);
    let mut noisy = original.clone();
    noisy.corrupt(SIGMA, &mut rng)?;

    // Create the graph
    let time_start = Instant::now();
    let mrf = construct_graph(noisy.pixels(), COLORS, SIGMA, SMOOTHING, LAMBDA)?;
    info!(
        "Pairwise Markov Random Field constructed. Elapsed time {:?}.",
        time_start.elapsed()
    );

    // Run the engine
    let mut options = EngineOptions::default();
    options
        .set_bound(1e-8)
        .set_damping(0.1)
        .set_scheduler(SchedulerType::Splash(100));
    let report = run(&mrf, &options)?;
    if !report.converged {
        info!(
            "Engine stopped before convergence, max residual {:e}.",
            report.max_residual
        );
    }

    // Compare the reconstructions with the original image
    info!(
        "Noisy image error: {:.4}.",
        noisy.mean_abs_error(&original)?
    );
    for prediction in [PredictionType::Map, PredictionType::Expectation] {
        let predicted = Image::from_beliefs(&mrf, prediction);
        info!(
            "{:?} prediction error: {:.4}.",
            prediction,
            predicted.mean_abs_error(&original)?
        );
    }

    Ok(())
}

fn main() -> ExitCode {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info"); // change "info" to "debug" for debug-level logging, etc.
    }
    env_logger::init();

    match denoise() {
        Ok(()) => {
            info!("Done!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Zip};
use ndarray_rand::{rand::Rng, rand_distr::Normal, RandomExt};

use crate::errors::BPError;

use super::builder::Mrf;

// How a belief is turned back into a pixel intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionType {
    Map,         // most likely state
    Expectation, // expected state
}

impl FromStr for PredictionType {
    type Err = BPError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "map" => Ok(PredictionType::Map),
            "exp" | "expectation" => Ok(PredictionType::Expectation),
            _ => Err(BPError::invalid_config(format!(
                "invalid prediction type \"{}\", options are {{map, exp}}",
                name
            ))),
        }
    }
}

// Grayscale image whose intensities are measured in color levels
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pixels: Array2<f64>,
}

impl Image {
    pub fn new(rows: usize, cols: usize) -> Self {
        Image {
            pixels: Array2::zeros((rows, cols)),
        }
    }

    pub fn rows(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn cols(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn pixels(&self) -> ArrayView2<f64> {
        self.pixels.view()
    }

    pub fn pixel(&self, row: usize, col: usize) -> f64 {
        self.pixels[(row, col)]
    }

    // Paints `num_rings` concentric bands of increasing color around a sun on the bottom edge
    pub fn paint_sunset(&mut self, num_rings: usize) {
        let (rows, cols) = self.pixels.dim();
        let center = (rows as f64, cols as f64 / 2.);
        let max_radius = center.0.hypot(center.1).max(1.);
        let last_ring = num_rings.saturating_sub(1) as f64;
        for ((row, col), pixel) in self.pixels.indexed_iter_mut() {
            let radius = (row as f64 + 0.5 - center.0).hypot(col as f64 + 0.5 - center.1);
            *pixel = (radius / max_radius * num_rings as f64).floor().min(last_ring);
        }
    }

    // Adds independent Gaussian noise with standard deviation `sigma` to every pixel
    pub fn corrupt<R: Rng + ?Sized>(&mut self, sigma: f64, rng: &mut R) -> Result<(), BPError> {
        if !(sigma.is_finite() && sigma >= 0.) {
            return Err(BPError::invalid_config(format!(
                "noise standard deviation must be non-negative, got {}",
                sigma
            )));
        }
        let normal = Normal::new(0., sigma).map_err(|err| {
            BPError::invalid_config(format!("invalid noise level {}: {}", sigma, err))
        })?;
        let noise = Array2::random_using(self.pixels.dim(), normal, rng);
        self.pixels += &noise;
        Ok(())
    }

    // Renders the current beliefs of a model built from an image
    pub fn from_beliefs(mrf: &Mrf, prediction: PredictionType) -> Self {
        let pixels = match prediction {
            PredictionType::Map => mrf.map_assignment().mapv(|state| state as f64),
            PredictionType::Expectation => mrf.expectations(),
        };
        Image { pixels }
    }

    pub fn mean_abs_error(&self, other: &Image) -> Result<f64, BPError> {
        if self.pixels.dim() != other.pixels.dim() {
            return Err(BPError::DimensionMismatch {
                expected: self.pixels.len(),
                found: other.pixels.len(),
            });
        }
        let mut total = 0.;
        Zip::from(&self.pixels)
            .and(&other.pixels)
            .for_each(|a, b| total += (a - b).abs());
        Ok(total / self.pixels.len().max(1) as f64)
    }
}

impl From<Array2<f64>> for Image {
    fn from(pixels: Array2<f64>) -> Self {
        Image { pixels }
    }
}

#[cfg(test)]
mod tests {
    use rand_xoshiro::{rand_core::SeedableRng, Xoshiro256PlusPlus};

    use crate::{
        engine::{
            options::{EngineOptions, SchedulerType},
            run::run,
        },
        mrf::builder::construct_graph,
    };

    use super::*;

    #[test]
    fn sunset_uses_every_ring() {
        let mut image = Image::new(30, 40);
        image.paint_sunset(4);
        for ring in 0..4 {
            assert!(image.pixels().iter().any(|pixel| *pixel == ring as f64));
        }
        assert!(image
            .pixels()
            .iter()
            .all(|pixel| pixel.fract() == 0. && (0. ..4.).contains(pixel)));
        // the sun sits at the bottom center
        assert_eq!(image.pixel(29, 20), 0.);
        assert_eq!(image.pixel(0, 0), 3.);
    }

    #[test]
    fn corrupt_adds_noise() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut image = Image::new(50, 50);
        image.paint_sunset(3);
        let original = image.clone();

        let mut unchanged = image.clone();
        unchanged.corrupt(0., &mut rng).unwrap();
        assert_eq!(unchanged, original);

        image.corrupt(1., &mut rng).unwrap();
        let error = image.mean_abs_error(&original).unwrap();
        // E|N(0, 1)| = sqrt(2 / pi)
        assert!((error - 0.798).abs() < 0.1, "{}", error);

        let corrupted = image.clone();
        for sigma in [-1., f64::NAN, f64::INFINITY] {
            assert!(matches!(
                image.corrupt(sigma, &mut rng),
                Err(BPError::InvalidConfiguration(_))
            ));
        }
        assert_eq!(image, corrupted);
        assert!(image.mean_abs_error(&Image::new(2, 2)).is_err());
    }

    #[test]
    fn parse_prediction_type() {
        assert_eq!("map".parse::<PredictionType>(), Ok(PredictionType::Map));
        assert_eq!(
            "exp".parse::<PredictionType>(),
            Ok(PredictionType::Expectation)
        );
        assert!("median".parse::<PredictionType>().is_err());
    }

    #[test]
    fn denoising_reduces_error() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut original = Image::new(24, 24);
        original.paint_sunset(3);
        let mut noisy = original.clone();
        noisy.corrupt(0.6, &mut rng).unwrap();

        let mrf = construct_graph(noisy.pixels(), 3, 0.6, "laplace", 1.5).unwrap();
        let mut options = EngineOptions::default();
        options
            .set_bound(1e-4)
            .set_num_workers(2)
            .set_scheduler(SchedulerType::Splash(20))
            .set_max_updates(500_000);
        let report = run(&mrf, &options).unwrap();
        assert_eq!(report.failed_updates, 0);

        let noisy_error = noisy.mean_abs_error(&original).unwrap();
        let map_error = Image::from_beliefs(&mrf, PredictionType::Map)
            .mean_abs_error(&original)
            .unwrap();
        let expectation = Image::from_beliefs(&mrf, PredictionType::Expectation);
        assert_eq!((expectation.rows(), expectation.cols()), (24, 24));
        assert!(map_error < noisy_error, "{} >= {}", map_error, noisy_error);
    }
}

use std::{
    fmt::Display,
    ops::{Index, IndexMut},
};

use log::warn;

use crate::errors::{check_arity, BPError};

use super::binary_factor::BinaryFactor;

// The minimum non-zero probability, substituted for a zero divisor when forming a cavity
pub const MIN_PROBA: f64 = 1e-40;

// Computes log(sum(exp(values))) with the max-subtraction trick
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|value| (value - max).exp()).sum::<f64>().ln()
}

// Discrete distribution over the states of a single variable, stored as log-weights
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnaryFactor {
    var: usize,
    log_p: Vec<f64>,
}

impl UnaryFactor {
    // Creates a uniform (unnormalized) factor over `arity` states of variable `var`
    pub fn new(var: usize, arity: usize) -> Self {
        UnaryFactor {
            var,
            log_p: vec![0.; arity],
        }
    }

    pub fn var(&self) -> usize {
        self.var
    }

    pub fn set_var(&mut self, var: usize) {
        self.var = var;
    }

    pub fn arity(&self) -> usize {
        self.log_p.len()
    }

    pub fn log_p(&self) -> &[f64] {
        &self.log_p
    }

    // Probability of the given state (assumes the factor is normalized)
    pub fn p(&self, state: usize) -> f64 {
        self.log_p[state].exp()
    }

    // Sets the number of states; the previous content is discarded
    pub fn resize(&mut self, arity: usize) {
        self.log_p.clear();
        self.log_p.resize(arity, 0.);
    }

    pub fn uniform(&mut self) {
        self.log_p.fill(0.);
    }

    // Copies the content of `other` without reallocating when arities agree
    pub fn assign(&mut self, other: &UnaryFactor) {
        self.var = other.var;
        self.log_p.clone_from(&other.log_p);
    }

    // Rescales the factor so that its probabilities sum to one.
    // The factor is left untouched if every entry is negative infinity.
    pub fn normalize(&mut self) -> Result<(), BPError> {
        let log_z = log_sum_exp(&self.log_p);
        if !log_z.is_finite() {
            return Err(BPError::DegenerateDistribution);
        }
        self.log_p.iter_mut().for_each(|value| *value -= log_z);
        Ok(())
    }

    // Normalizes the factor, replacing a degenerate factor with the uniform distribution
    pub fn normalize_or_uniform(&mut self) {
        if let Err(err) = self.normalize() {
            warn!("{} Using uniform distribution for variable {}.", err, self.var);
            let log_uniform = -(self.arity() as f64).ln();
            self.log_p.fill(log_uniform);
        }
    }

    // Pointwise product in probability space
    pub fn times(&mut self, other: &UnaryFactor) -> Result<(), BPError> {
        check_arity(self.arity(), other.arity())?;
        for (value, other_value) in self.log_p.iter_mut().zip(other.log_p.iter()) {
            *value += other_value;
        }
        Ok(())
    }

    // Pointwise quotient in probability space.
    // Zero-probability states of `self` stay at zero; a zero-probability state of `other`
    // is replaced by MIN_PROBA.
    pub fn divide(&mut self, other: &UnaryFactor) -> Result<(), BPError> {
        check_arity(self.arity(), other.arity())?;
        let floor = MIN_PROBA.ln();
        for (value, &other_value) in self.log_p.iter_mut().zip(other.log_p.iter()) {
            if *value == f64::NEG_INFINITY {
                continue;
            }
            *value -= other_value.max(floor);
        }
        Ok(())
    }

    // Sets self[s] = log sum_t exp(binary[s, t] + other[t]), i.e. the sum-product message across an edge
    pub fn convolve(&mut self, binary: &BinaryFactor, other: &UnaryFactor) -> Result<(), BPError> {
        check_arity(binary.cols(), other.arity())?;
        self.resize(binary.rows());
        for (state, row) in binary.log_p().outer_iter().enumerate() {
            let max = row
                .iter()
                .zip(other.log_p.iter())
                .map(|(b, u)| b + u)
                .fold(f64::NEG_INFINITY, f64::max);
            self.log_p[state] = if max == f64::NEG_INFINITY {
                f64::NEG_INFINITY
            } else {
                let sum: f64 = row
                    .iter()
                    .zip(other.log_p.iter())
                    .map(|(b, u)| (b + u - max).exp())
                    .sum();
                max + sum.ln()
            };
        }
        Ok(())
    }

    // Blends `previous` into this factor in probability space with weight `alpha` on `previous`
    pub fn damp(&mut self, previous: &UnaryFactor, alpha: f64) -> Result<(), BPError> {
        check_arity(self.arity(), previous.arity())?;
        if alpha == 0. {
            return Ok(());
        }
        if alpha == 1. {
            self.log_p.copy_from_slice(&previous.log_p);
            return Ok(());
        }
        for (value, previous_value) in self.log_p.iter_mut().zip(previous.log_p.iter()) {
            *value = (alpha * previous_value.exp() + (1. - alpha) * value.exp()).ln();
        }
        Ok(())
    }

    // L1 distance between the two factors in probability space
    pub fn residual(&self, other: &UnaryFactor) -> Result<f64, BPError> {
        check_arity(self.arity(), other.arity())?;
        Ok(self
            .log_p
            .iter()
            .zip(other.log_p.iter())
            .map(|(a, b)| (a.exp() - b.exp()).abs())
            .sum())
    }

    // Returns the most likely state (the lowest one on ties)
    pub fn max_asg(&self) -> usize {
        let mut best_state = 0;
        for (state, value) in self.log_p.iter().enumerate() {
            if *value > self.log_p[best_state] {
                best_state = state;
            }
        }
        best_state
    }

    // Returns the expected state index
    pub fn expectation(&self) -> f64 {
        let mut normalized = self.clone();
        normalized.normalize_or_uniform();
        normalized
            .log_p
            .iter()
            .enumerate()
            .map(|(state, value)| state as f64 * value.exp())
            .sum()
    }
}

impl Display for UnaryFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.log_p
                .iter()
                .map(|value| value.exp().to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

impl Index<usize> for UnaryFactor {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.log_p[index]
    }
}

impl IndexMut<usize> for UnaryFactor {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.log_p[index]
    }
}

impl From<Vec<f64>> for UnaryFactor {
    fn from(value: Vec<f64>) -> Self {
        UnaryFactor {
            var: 0,
            log_p: value,
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    const EPS: f64 = 1e-12;

    fn from_probabilities(probabilities: &[f64]) -> UnaryFactor {
        UnaryFactor::from(probabilities.iter().map(|p| p.ln()).collect::<Vec<f64>>())
    }

    fn assert_close(a: &UnaryFactor, b: &UnaryFactor) {
        assert_eq!(a.arity(), b.arity());
        for state in 0..a.arity() {
            assert!(
                (a.p(state) - b.p(state)).abs() < 1e-9,
                "state {}: {} vs {}",
                state,
                a,
                b
            );
        }
    }

    #[test]
    fn normalize_sums_to_one() {
        for log_p in [
            vec![0., 0., 0.],
            vec![-3., 1., 7.5, -0.25],
            vec![800., 799., 790.],
            vec![-900., -1000., f64::NEG_INFINITY],
        ] {
            let mut factor = UnaryFactor::from(log_p);
            factor.normalize().unwrap();
            let total: f64 = (0..factor.arity()).map(|state| factor.p(state)).sum();
            assert!((total - 1.).abs() < EPS);
        }
    }

    #[test]
    fn normalize_degenerate() {
        let mut factor = UnaryFactor::from(vec![f64::NEG_INFINITY; 3]);
        assert_eq!(factor.normalize(), Err(BPError::DegenerateDistribution));
        assert!(factor.log_p().iter().all(|value| *value == f64::NEG_INFINITY));

        factor.normalize_or_uniform();
        for state in 0..3 {
            assert!((factor.p(state) - 1. / 3.).abs() < EPS);
        }
    }

    #[test]
    fn resize_and_uniform() {
        let mut factor = UnaryFactor::from(vec![1., 2.]);
        factor.resize(4);
        assert_eq!(factor.log_p(), &[0.; 4]);
        factor[2] = 5.;
        factor.uniform();
        factor.normalize().unwrap();
        assert!((factor.p(2) - 0.25).abs() < EPS);
    }

    #[test]
    fn times_then_divide() {
        let f = from_probabilities(&[0.2, 0.5, 0.3]);
        let g = from_probabilities(&[0.6, 0.1, 0.3]);
        let mut result = f.clone();
        result.times(&g).unwrap();
        result.normalize().unwrap();
        result.divide(&g).unwrap();
        result.normalize().unwrap();
        assert_close(&result, &f);
    }

    #[test]
    fn divide_uses_floor() {
        let mut cavity = from_probabilities(&[0.5, 0.5, 0.]);
        let divisor = UnaryFactor::from(vec![0., f64::NEG_INFINITY, f64::NEG_INFINITY]);
        cavity.divide(&divisor).unwrap();
        assert!(cavity.log_p().iter().all(|value| !value.is_nan()));
        assert_eq!(cavity[2], f64::NEG_INFINITY);
        assert!((cavity[1] - (0.5f64.ln() - MIN_PROBA.ln())).abs() < EPS);
        cavity.normalize().unwrap();
        assert_eq!(cavity.max_asg(), 1);
    }

    #[test]
    fn dimension_mismatch() {
        let mut f = UnaryFactor::new(0, 3);
        let g = UnaryFactor::new(1, 2);
        let expected = Err(BPError::DimensionMismatch {
            expected: 3,
            found: 2,
        });
        assert_eq!(f.times(&g), expected);
        assert_eq!(f.divide(&g), expected);
        assert_eq!(f.damp(&g, 0.5), expected);
        assert_eq!(f.residual(&g).map(|_| ()), expected);
        assert_eq!(f.log_p(), &[0.; 3]);

        let binary = BinaryFactor::new(3);
        assert_eq!(
            f.convolve(&binary, &g),
            Err(BPError::DimensionMismatch {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn damp_endpoints() {
        let previous = from_probabilities(&[0.1, 0.9]);
        let new = from_probabilities(&[0.7, 0.3]);

        let mut keep_previous = new.clone();
        keep_previous.damp(&previous, 1.).unwrap();
        assert_eq!(keep_previous, previous);

        let mut keep_new = new.clone();
        keep_new.damp(&previous, 0.).unwrap();
        assert_eq!(keep_new, new);

        let mut half = new.clone();
        half.damp(&previous, 0.5).unwrap();
        assert!((half.p(0) - 0.4).abs() < EPS);
        assert!((half.p(1) - 0.6).abs() < EPS);
    }

    #[test]
    fn residual_properties() {
        let f = from_probabilities(&[0.2, 0.5, 0.3]);
        let g = from_probabilities(&[0.6, 0.1, 0.3]);
        assert_eq!(f.residual(&f).unwrap(), 0.);
        let forward = f.residual(&g).unwrap();
        let backward = g.residual(&f).unwrap();
        assert!(forward >= 0.);
        assert!((forward - backward).abs() < EPS);
        assert!((forward - 0.8).abs() < EPS);
    }

    #[test]
    fn convolve_with_identity_and_constant() {
        let cavity = from_probabilities(&[0.25, 0.75]);
        let identity = BinaryFactor::from(Array2::from_shape_fn((2, 2), |(i, j)| {
            if i == j {
                0.
            } else {
                f64::NEG_INFINITY
            }
        }));
        let mut message = UnaryFactor::new(7, 0);
        message.convolve(&identity, &cavity).unwrap();
        message.normalize().unwrap();
        assert_eq!(message.arity(), 2);
        assert_close(&message, &cavity);

        let constant = BinaryFactor::new(2);
        message.convolve(&constant, &cavity).unwrap();
        message.normalize().unwrap();
        assert!((message.p(0) - 0.5).abs() < EPS);
    }

    #[test]
    fn decoding() {
        let belief = from_probabilities(&[0.1, 0.7, 0.2]);
        assert_eq!(belief.max_asg(), 1);
        assert!((belief.expectation() - 1.1).abs() < EPS);

        let tied = UnaryFactor::from(vec![0., 0., -1.]);
        assert_eq!(tied.max_asg(), 0);
    }

    #[test]
    fn display_probabilities() {
        let factor = UnaryFactor::from(vec![0., 0.]);
        assert_eq!(factor.to_string(), "1 1");
    }
}

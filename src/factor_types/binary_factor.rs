use std::{fmt::Display, ops::Index, str::FromStr};

use ndarray::Array2;

use crate::errors::BPError;

// Smoothing prior shared by every edge of the lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    Agreement, // rewards equal neighbouring states
    Laplace,   // penalizes the distance between neighbouring states
}

impl FromStr for Smoothing {
    type Err = BPError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "agreement" | "square" => Ok(Smoothing::Agreement),
            "laplace" | "graduated-penalty" => Ok(Smoothing::Laplace),
            _ => Err(BPError::invalid_config(format!(
                "unknown smoothing type \"{}\", options are {{agreement, laplace}}",
                name
            ))),
        }
    }
}

impl Display for Smoothing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Smoothing::Agreement => write!(f, "agreement"),
            Smoothing::Laplace => write!(f, "laplace"),
        }
    }
}

// Log-weight table over pairs of states, indexed by (receiving state, sending state)
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryFactor {
    log_p: Array2<f64>,
}

impl BinaryFactor {
    // Creates a constant factor over `arity` x `arity` state pairs
    pub fn new(arity: usize) -> Self {
        BinaryFactor {
            log_p: Array2::zeros((arity, arity)),
        }
    }

    pub fn from_smoothing(smoothing: Smoothing, arity: usize, lambda: f64) -> Self {
        let mut factor = BinaryFactor::new(arity);
        match smoothing {
            Smoothing::Agreement => factor.set_as_agreement(lambda),
            Smoothing::Laplace => factor.set_as_laplace(lambda),
        }
        factor
    }

    pub fn rows(&self) -> usize {
        self.log_p.nrows()
    }

    pub fn cols(&self) -> usize {
        self.log_p.ncols()
    }

    pub fn log_p(&self) -> &Array2<f64> {
        &self.log_p
    }

    // Equal states get log-weight `lambda`, all other pairs get zero
    pub fn set_as_agreement(&mut self, lambda: f64) {
        for ((row, col), value) in self.log_p.indexed_iter_mut() {
            *value = if row == col { lambda } else { 0. };
        }
    }

    // Log-weight decreases linearly with the distance between the states
    pub fn set_as_laplace(&mut self, lambda: f64) {
        for ((row, col), value) in self.log_p.indexed_iter_mut() {
            *value = -lambda * row.abs_diff(col) as f64;
        }
    }

    pub fn is_symmetric(&self) -> bool {
        self.log_p == self.log_p.t()
    }
}

impl Index<(usize, usize)> for BinaryFactor {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.log_p[index]
    }
}

impl From<Array2<f64>> for BinaryFactor {
    fn from(value: Array2<f64>) -> Self {
        BinaryFactor { log_p: value }
    }
}

impl Display for BinaryFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.log_p.outer_iter() {
            writeln!(
                f,
                "{}",
                row.iter()
                    .map(|value| value.to_string())
                    .collect::<Vec<String>>()
                    .join(" ")
            )?;
        }
        Ok(())
    }
}

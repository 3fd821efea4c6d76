use crate::{
    errors::BPError, factor_types::binary_factor::BinaryFactor, mrf::builder::Mrf,
};

use super::options::EngineOptions;

// Read-only constants shared by every update of a run
#[derive(Debug, Clone)]
pub struct SharedData {
    edge_factor: BinaryFactor,
    bound: f64,
    damping: f64,
}

impl SharedData {
    pub fn new(edge_factor: BinaryFactor, bound: f64, damping: f64) -> Result<Self, BPError> {
        if edge_factor.rows() != edge_factor.cols() {
            return Err(BPError::DimensionMismatch {
                expected: edge_factor.rows(),
                found: edge_factor.cols(),
            });
        }
        if !(0. ..=1.).contains(&damping) {
            return Err(BPError::invalid_config(format!(
                "damping must lie in [0, 1], got {}",
                damping
            )));
        }
        Ok(SharedData {
            edge_factor,
            bound,
            damping,
        })
    }

    pub fn from_options(mrf: &Mrf, options: &EngineOptions) -> Result<Self, BPError> {
        SharedData::new(mrf.edge_factor.clone(), options.bound(), options.damping())
    }

    pub fn edge_factor(&self) -> &BinaryFactor {
        &self.edge_factor
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }
}

use log::{debug, info};
use ndarray::{Array2, ArrayView2};

use crate::{
    errors::BPError,
    factor_types::{
        binary_factor::{BinaryFactor, Smoothing},
        unary_factor::UnaryFactor,
    },
};

use super::graph::{EdgeData, MrfGraph, VertexData};

// A finalized lattice Markov random field together with its shared edge factor
pub struct Mrf {
    pub graph: MrfGraph,
    pub edge_factor: BinaryFactor,
    rows: usize,
    cols: usize,
}

impl Mrf {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_rings(&self) -> usize {
        self.edge_factor.rows()
    }

    pub fn vertex_id(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    // Most likely state of every pixel
    pub fn map_assignment(&self) -> Array2<usize> {
        Array2::from_shape_fn((self.rows, self.cols), |(row, col)| {
            self.graph
                .lock_vertex(self.vertex_id(row, col))
                .belief
                .max_asg()
        })
    }

    // Expected state of every pixel
    pub fn expectations(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows, self.cols), |(row, col)| {
            self.graph
                .lock_vertex(self.vertex_id(row, col))
                .belief
                .expectation()
        })
    }
}

fn validate(
    image: &ArrayView2<f64>,
    num_rings: usize,
    sigma: f64,
    lambda: f64,
) -> Result<(), BPError> {
    if image.nrows() == 0 || image.ncols() == 0 {
        return Err(BPError::invalid_config(format!(
            "grid dimensions must be positive, got {}x{}",
            image.nrows(),
            image.ncols()
        )));
    }
    if num_rings == 0 {
        return Err(BPError::invalid_config("number of colors must be positive"));
    }
    if !(sigma.is_finite() && sigma > 0.) {
        return Err(BPError::invalid_config(format!(
            "noise standard deviation must be positive, got {}",
            sigma
        )));
    }
    if !lambda.is_finite() {
        return Err(BPError::invalid_config(format!(
            "smoothness must be finite, got {}",
            lambda
        )));
    }
    if let Some(((row, col), value)) = image.indexed_iter().find(|(_, value)| !value.is_finite()) {
        return Err(BPError::invalid_config(format!(
            "pixel ({}, {}) has non-finite intensity {}",
            row, col, value
        )));
    }
    Ok(())
}

// Constructs the 4-connected denoising model of the given noisy image:
// one variable with `num_rings` states per pixel and a Gaussian noise potential
// with standard deviation `sigma`, coupled by the `smoothing` prior of strength `lambda`
pub fn construct_graph(
    image: ArrayView2<f64>,
    num_rings: usize,
    sigma: f64,
    smoothing: &str,
    lambda: f64,
) -> Result<Mrf, BPError> {
    let smoothing: Smoothing = smoothing.parse()?;
    validate(&image, num_rings, sigma, lambda)?;

    let (rows, cols) = image.dim();
    info!(
        "Constructing pairwise Markov Random Field: {}x{} pixels, {} colors, sigma {}, {} smoothing with lambda {}.",
        rows, cols, num_rings, sigma, smoothing, lambda
    );

    let num_edges = 2 * (rows * (cols - 1) + cols * (rows - 1));
    let mut graph = MrfGraph::with_capacity(rows * cols, num_edges);

    // Add all the vertices
    let sigma_sq = sigma * sigma;
    let mut belief = UnaryFactor::new(0, num_rings);
    belief.normalize()?;
    for ((row, col), &observed) in image.indexed_iter() {
        let vertex = row * cols + col;
        let mut potential = UnaryFactor::new(vertex, num_rings);
        for state in 0..num_rings {
            let diff = observed - state as f64;
            potential[state] = -diff * diff / (2. * sigma_sq);
        }
        potential.normalize()?;
        belief.set_var(vertex);

        let vertex_id = graph.add_vertex(VertexData::new(potential, belief.clone()))?;
        debug_assert_eq!(vertex_id, vertex);
    }

    // Add the edges, two directed edges per pair of neighbouring pixels
    let mut message = UnaryFactor::new(0, num_rings);
    message.normalize()?;
    for row in 0..rows {
        for col in 0..cols {
            let source = row * cols + col;
            let neighbors = [
                row.checked_sub(1).map(|up| (up, col)),
                (row + 1 < rows).then(|| (row + 1, col)),
                col.checked_sub(1).map(|left| (row, left)),
                (col + 1 < cols).then(|| (row, col + 1)),
            ];
            for (target_row, target_col) in neighbors.into_iter().flatten() {
                let target = target_row * cols + target_col;
                message.set_var(target);
                graph.add_edge(source, target, EdgeData::new(message.clone()))?;
            }
        }
    }
    debug!("Added {} directed edges", graph.num_edges());

    graph.finalize()?;

    let edge_factor = BinaryFactor::from_smoothing(smoothing, num_rings, lambda);
    debug!("Shared edge factor:\n{}", edge_factor);

    Ok(Mrf {
        graph,
        edge_factor,
        rows,
        cols,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn lattice_topology() {
        let image = Array2::<f64>::zeros((3, 3));
        let mrf = construct_graph(image.view(), 2, 1., "square", 1.).unwrap();
        let graph = &mrf.graph;

        assert!(graph.is_finalized());
        assert_eq!(graph.num_vertices(), 9);
        assert_eq!(graph.num_edges(), 24);
        assert_eq!(graph.out_edges(0).len(), 2);
        assert_eq!(graph.out_edges(1).len(), 3);
        assert_eq!(graph.out_edges(4).len(), 4);

        let mut neighbors: Vec<usize> = graph.neighbors(4).collect();
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![1, 3, 5, 7]);

        for edge in 0..graph.num_edges() {
            let reverse = graph.reverse_edge(edge);
            assert_eq!(graph.source(edge), graph.target(reverse));
            assert_eq!(graph.target(edge), graph.source(reverse));
        }
    }

    #[test]
    fn potentials_follow_noise_model() {
        let image = array![[0., 2.], [1.2, 3.7]];
        let mrf = construct_graph(image.view(), 4, 0.5, "laplace", 2.).unwrap();

        assert_eq!((mrf.rows(), mrf.cols()), (2, 2));
        assert_eq!(mrf.num_rings(), 4);
        assert_eq!(mrf.edge_factor[(0, 3)], -6.);

        let expected_states = [0, 2, 1, 3];
        for (vertex, expected_state) in expected_states.iter().enumerate() {
            let data = mrf.graph.vertex_data(vertex);
            assert_eq!(data.potential.var(), vertex);
            assert_eq!(data.potential.max_asg(), *expected_state);
            let total: f64 = (0..4).map(|state| data.potential.p(state)).sum();
            assert!((total - 1.).abs() < 1e-12);
            assert!((data.belief.p(2) - 0.25).abs() < 1e-12);
        }

        let edge = mrf.graph.out_edges(0)[0];
        let edge_data = mrf.graph.edge_data(edge);
        assert_eq!(edge_data.message, edge_data.old_message);
        assert_eq!(edge_data.message.var(), mrf.graph.target(edge));
    }

    #[test]
    fn invalid_configurations() {
        let image = Array2::<f64>::zeros((2, 2));
        let is_invalid = |result: Result<Mrf, BPError>| {
            matches!(result, Err(BPError::InvalidConfiguration(_)))
        };

        assert!(is_invalid(construct_graph(image.view(), 2, 1., "cubic", 1.)));
        assert!(is_invalid(construct_graph(image.view(), 0, 1., "square", 1.)));
        assert!(is_invalid(construct_graph(image.view(), 2, 0., "square", 1.)));
        assert!(is_invalid(construct_graph(image.view(), 2, 1., "square", f64::NAN)));

        let empty = Array2::<f64>::zeros((0, 4));
        assert!(is_invalid(construct_graph(empty.view(), 2, 1., "square", 1.)));

        let corrupted = array![[0., f64::INFINITY]];
        assert!(is_invalid(construct_graph(corrupted.view(), 2, 1., "square", 1.)));
    }

    #[test]
    fn single_pixel() {
        let image = array![[1.]];
        let mrf = construct_graph(image.view(), 3, 1., "laplace", 1.).unwrap();
        assert_eq!(mrf.graph.num_edges(), 0);
        assert!(mrf.graph.out_edges(0).is_empty());
    }
}

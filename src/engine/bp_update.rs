use log::debug;

use crate::{
    errors::{check_arity, BPError},
    factor_types::unary_factor::UnaryFactor,
    mrf::graph::MrfGraph,
};

use super::shared_data::SharedData;

// Buffers reused across the updates run by one worker
#[derive(Debug, Default)]
pub struct UpdateScratch {
    snapshots: Vec<UnaryFactor>, // incoming messages, aligned with the vertex's in edges
    cavity: UnaryFactor,
    candidate: UnaryFactor,
}

impl UpdateScratch {
    pub fn new() -> Self {
        UpdateScratch::default()
    }
}

// The belief propagation update of a single vertex.
// Recomputes the belief of `vertex` from its potential and incoming messages, then sends a new
// message along every outgoing edge. Every receiving vertex whose message changed by more than
// the bound is passed to `schedule` together with the residual.
// Returns the largest residual among the outgoing messages.
// On error nothing has been written.
pub fn bp_update<F>(
    graph: &MrfGraph,
    vertex: usize,
    shared_data: &SharedData,
    scratch: &mut UpdateScratch,
    mut schedule: F,
) -> Result<f64, BPError>
where
    F: FnMut(usize, f64),
{
    let edge_factor = shared_data.edge_factor();
    let mut v_data = graph.lock_vertex(vertex);
    let v_data = &mut *v_data;

    let in_edges = graph.in_edges(vertex);
    let out_edges = graph.out_edges(vertex);
    debug_assert_eq!(in_edges.len(), out_edges.len());

    // Read the current incoming messages and check all dimensions before writing anything
    let arity = v_data.potential.arity();
    check_arity(arity, edge_factor.cols())?;
    scratch
        .snapshots
        .resize_with(in_edges.len(), UnaryFactor::default);
    for (snapshot, in_edge) in scratch.snapshots.iter_mut().zip(in_edges) {
        snapshot.assign(&graph.edge(*in_edge).message());
        check_arity(arity, snapshot.arity())?;
    }
    for out_edge in out_edges {
        let edge = graph.edge(*out_edge);
        check_arity(arity, edge.message().arity())?;
        check_arity(arity, edge.old_message().arity())?;
    }

    // Since we are about to receive the current messages make them the old messages,
    // neighbouring vertices may keep writing new ones meanwhile
    for (snapshot, in_edge) in scratch.snapshots.iter().zip(in_edges) {
        graph.edge(*in_edge).old_message_mut().assign(snapshot);
    }

    // Compute the belief
    v_data.belief.assign(&v_data.potential);
    for snapshot in scratch.snapshots.iter() {
        v_data.belief.times(snapshot)?;
    }
    v_data.belief.normalize_or_uniform();

    // Send outbound messages
    let mut max_residual = 0.;
    for (out_edge, snapshot) in out_edges.iter().zip(scratch.snapshots.iter()) {
        let target = graph.target(*out_edge);

        // Remove the target's own message from the belief
        scratch.cavity.assign(&v_data.belief);
        scratch.cavity.divide(snapshot)?;
        scratch.cavity.normalize_or_uniform();

        scratch.candidate.set_var(target);
        scratch.candidate.convolve(edge_factor, &scratch.cavity)?;
        scratch.candidate.normalize_or_uniform();

        let edge = graph.edge(*out_edge);
        scratch.candidate.damp(&edge.message(), shared_data.damping())?;
        let residual = scratch.candidate.residual(&edge.old_message())?;
        edge.message_mut().assign(&scratch.candidate);

        if residual > max_residual {
            max_residual = residual;
        }
        if residual > shared_data.bound() {
            schedule(target, residual);
        }
    }

    v_data.residual = max_residual;
    debug!(
        "Updated vertex {}, belief [{}], max residual {}",
        vertex, v_data.belief, max_residual
    );
    Ok(max_residual)
}

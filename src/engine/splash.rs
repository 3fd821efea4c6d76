use std::collections::VecDeque;

use log::debug;

use crate::mrf::graph::MrfGraph;

use super::scheduler::Scheduler;

impl Scheduler {
    // Pops the highest priority vertex and grows a breadth-first tree of at most `splash_size`
    // pending vertices around it. Every returned vertex is in flight until completed.
    // The root comes first, the vertices follow in breadth-first order.
    pub fn pop_splash(&self, graph: &MrfGraph, splash_size: usize) -> Vec<usize> {
        let mut state = self.state();
        let Some(root) = state.pop_max() else {
            return Vec::new();
        };

        let mut splash = Vec::with_capacity(splash_size);
        splash.push(root);
        let mut frontier = VecDeque::with_capacity(splash_size);
        frontier.push_back(root);

        while splash.len() < splash_size {
            let Some(vertex) = frontier.pop_front() else {
                break;
            };
            for neighbor in graph.neighbors(vertex) {
                if splash.len() >= splash_size {
                    break;
                }
                if state.claim(neighbor) {
                    splash.push(neighbor);
                    frontier.push_back(neighbor);
                }
            }
        }

        debug!("Splash rooted at {} with {} vertices", root, splash.len());
        splash
    }
}

// Order in which a splash is updated: from the leaves up to the root, then back down to the leaves
pub fn splash_order(splash: &[usize]) -> impl Iterator<Item = usize> + '_ {
    splash
        .iter()
        .rev()
        .chain(splash.iter().skip(1))
        .copied()
}

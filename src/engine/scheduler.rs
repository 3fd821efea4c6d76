use std::{
    cmp::{Ordering, Reverse},
    collections::BTreeSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bitvec::{order::LocalBits, vec::BitVec};

// Totally ordered wrapper for residual priorities
#[derive(Debug, Clone, Copy)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

// Queue state guarded by the scheduler lock.
// A vertex is pending iff `priorities[v]` is set; a pending vertex sits in `queue`
// unless it is in flight, in which case it re-enters `queue` on completion.
pub(super) struct SchedulerState {
    queue: BTreeSet<(Priority, Reverse<usize>)>, // last element: highest priority, lowest id
    priorities: Vec<Option<f64>>,
    in_flight: BitVec<usize, LocalBits>,
    num_in_flight: usize,
}

impl SchedulerState {
    fn push(&mut self, vertex: usize, priority: f64) {
        if priority.is_nan() {
            return;
        }
        let in_flight = self.in_flight[vertex];
        match self.priorities[vertex] {
            Some(current) if current >= priority => return,
            Some(current) if !in_flight => {
                self.queue.remove(&(Priority(current), Reverse(vertex)));
            }
            _ => {}
        }
        self.priorities[vertex] = Some(priority);
        if !in_flight {
            self.queue.insert((Priority(priority), Reverse(vertex)));
        }
    }

    // Removes the pending vertex of highest priority and marks it in flight
    pub(super) fn pop_max(&mut self) -> Option<usize> {
        let (_, Reverse(vertex)) = self.queue.pop_last()?;
        self.priorities[vertex] = None;
        self.in_flight.set(vertex, true);
        self.num_in_flight += 1;
        Some(vertex)
    }

    // Takes a pending vertex that is not in flight out of the queue and marks it in flight
    pub(super) fn claim(&mut self, vertex: usize) -> bool {
        if self.in_flight[vertex] {
            return false;
        }
        let Some(priority) = self.priorities[vertex].take() else {
            return false;
        };
        self.queue.remove(&(Priority(priority), Reverse(vertex)));
        self.in_flight.set(vertex, true);
        self.num_in_flight += 1;
        true
    }

    fn complete(&mut self, vertex: usize) {
        if !self.in_flight[vertex] {
            return;
        }
        self.in_flight.set(vertex, false);
        self.num_in_flight -= 1;
        if let Some(priority) = self.priorities[vertex] {
            self.queue.insert((Priority(priority), Reverse(vertex)));
        }
    }

    fn num_pending(&self) -> usize {
        self.priorities.iter().filter(|priority| priority.is_some()).count()
    }
}

// Residual-priority task queue over vertices, safe to share between workers.
// `pop()` hands a vertex to exactly one worker; it stays in flight until `complete()`,
// and pushes it receives meanwhile are kept and take effect once it completes.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    // Creates a scheduler with no pending vertex
    pub fn new(num_vertices: usize) -> Self {
        Scheduler {
            state: Mutex::new(SchedulerState {
                queue: BTreeSet::new(),
                priorities: vec![None; num_vertices],
                in_flight: BitVec::repeat(false, num_vertices),
                num_in_flight: 0,
            }),
        }
    }

    // Creates a scheduler with every vertex pending at the given priority
    pub fn with_all(num_vertices: usize, priority: f64) -> Self {
        let scheduler = Scheduler::new(num_vertices);
        {
            let mut state = scheduler.state();
            for vertex in 0..num_vertices {
                state.push(vertex, priority);
            }
        }
        scheduler
    }

    pub(super) fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Raises the pending priority of a vertex to at least `priority`
    pub fn push(&self, vertex: usize, priority: f64) {
        self.state().push(vertex, priority);
    }

    // Returns the pending vertex of highest priority (the lowest id on ties), or None if nothing is pending
    pub fn pop(&self) -> Option<usize> {
        self.state().pop_max()
    }

    // Releases a vertex obtained from `pop()` or a splash
    pub fn complete(&self, vertex: usize) {
        self.state().complete(vertex);
    }

    pub fn complete_all(&self, vertices: &[usize]) {
        let mut state = self.state();
        for vertex in vertices {
            state.complete(*vertex);
        }
    }

    // Pending priority of a vertex, None if the vertex is idle
    pub fn priority(&self, vertex: usize) -> Option<f64> {
        self.state().priorities[vertex]
    }

    pub fn max_priority(&self) -> Option<f64> {
        self.state()
            .priorities
            .iter()
            .flatten()
            .copied()
            .max_by(f64::total_cmp)
    }

    // Number of pending vertices
    pub fn len(&self) -> usize {
        self.state().num_pending()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_in_flight(&self) -> usize {
        self.state().num_in_flight
    }

    // True when no vertex is pending and no vertex is being updated
    pub fn is_drained(&self) -> bool {
        let state = self.state();
        state.num_in_flight == 0 && state.queue.is_empty()
    }
}

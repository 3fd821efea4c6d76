use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::{
    errors::BPError,
    mrf::{builder::Mrf, graph::MrfGraph},
};

use super::{
    bp_update::{bp_update, UpdateScratch},
    options::{EngineOptions, SchedulerType},
    scheduler::Scheduler,
    shared_data::SharedData,
    splash::splash_order,
};

// Pause of a worker that found nothing to pop while other vertices are still in flight
const IDLE_WAIT: Duration = Duration::from_micros(50);

// Outcome of an inference run. A run that hits a cap is not an error: `converged` is false
// and `max_residual` tells how far from a fixed point the messages are.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub converged: bool,
    pub updates: usize,
    pub failed_updates: usize,
    pub elapsed: Duration,
    pub max_residual: f64, // largest distance between a message and the version its receiver last used
}

impl RunReport {
    pub fn updates_per_second(&self) -> f64 {
        self.updates as f64 / self.elapsed.as_secs_f64().max(f64::MIN_POSITIVE)
    }
}

// Returns the largest residual between the current and the last received message over all edges
pub fn max_message_residual(graph: &MrfGraph) -> f64 {
    (0..graph.num_edges())
        .filter_map(|edge| {
            let edge = graph.edge(edge);
            let message = edge.message();
            let residual = message.residual(&edge.old_message());
            residual.ok()
        })
        .fold(0., f64::max)
}

// State shared by the workers of one run
struct Workers<'a> {
    graph: &'a MrfGraph,
    shared_data: &'a SharedData,
    scheduler: &'a Scheduler,
    options: &'a EngineOptions,
    time_start: Instant,
    updates: AtomicUsize,
    failed_updates: AtomicUsize,
    interrupted: AtomicBool,
}

impl<'a> Workers<'a> {
    fn interrupt(&self, reason: &str) {
        if !self.interrupted.swap(true, Ordering::Relaxed) {
            warn!("{} Interrupting.", reason);
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    fn update(&self, vertex: usize, scratch: &mut UpdateScratch) {
        let result = bp_update(
            self.graph,
            vertex,
            self.shared_data,
            scratch,
            |target, residual| self.scheduler.push(target, residual),
        );
        if let Err(err) = result {
            error!("Update of vertex {} aborted: {}", vertex, err);
            self.failed_updates.fetch_add(1, Ordering::Relaxed);
        }

        let updates = self.updates.fetch_add(1, Ordering::Relaxed) + 1;
        if updates >= self.options.max_updates() {
            self.interrupt("Maximum number of updates reached.");
        }
        if self.time_start.elapsed() >= self.options.time_max() {
            self.interrupt("Time limit reached.");
        }
    }

    // Called when nothing could be popped; returns true once the whole run is over
    fn is_finished(&self) -> bool {
        if self.scheduler.is_drained() {
            return true;
        }
        thread::sleep(IDLE_WAIT);
        false
    }

    fn run_worker(&self, worker: usize) {
        debug!("Worker {} started", worker);
        let mut scratch = UpdateScratch::new();

        while !self.is_interrupted() {
            match self.options.scheduler() {
                SchedulerType::Priority => {
                    let Some(vertex) = self.scheduler.pop() else {
                        if self.is_finished() {
                            break;
                        }
                        continue;
                    };
                    self.update(vertex, &mut scratch);
                    self.scheduler.complete(vertex);
                }
                SchedulerType::Splash(splash_size) => {
                    let splash = self.scheduler.pop_splash(self.graph, splash_size);
                    if splash.is_empty() {
                        if self.is_finished() {
                            break;
                        }
                        continue;
                    }
                    for vertex in splash_order(&splash) {
                        if self.is_interrupted() {
                            break;
                        }
                        self.update(vertex, &mut scratch);
                    }
                    self.scheduler.complete_all(&splash);
                }
            }
        }
        debug!("Worker {} finished", worker);
    }
}

// Runs asynchronous residual belief propagation on the given model until the scheduler
// drains or a cap from `options` is reached
pub fn run(mrf: &Mrf, options: &EngineOptions) -> Result<RunReport, BPError> {
    options.validate()?;
    let shared_data = SharedData::from_options(mrf, options)?;
    let graph = &mrf.graph;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.num_workers())
        .build()
        .map_err(|err| BPError::ThreadPool(err.to_string()))?;

    // Add the bp update to all vertices
    let scheduler = Scheduler::with_all(graph.num_vertices(), options.initial_priority());

    info!(
        "Running the engine. Workers: {}. Scheduler: {}. Bound: {}. Damping: {}.",
        options.num_workers(),
        options.scheduler(),
        options.bound(),
        options.damping()
    );

    let workers = Workers {
        graph,
        shared_data: &shared_data,
        scheduler: &scheduler,
        options,
        time_start: Instant::now(),
        updates: AtomicUsize::new(0),
        failed_updates: AtomicUsize::new(0),
        interrupted: AtomicBool::new(false),
    };
    pool.scope(|scope| {
        for worker in 0..options.num_workers() {
            let workers = &workers;
            scope.spawn(move |_| workers.run_worker(worker));
        }
    });

    let report = RunReport {
        converged: scheduler.is_drained(),
        updates: workers.updates.load(Ordering::Relaxed),
        failed_updates: workers.failed_updates.load(Ordering::Relaxed),
        elapsed: workers.time_start.elapsed(),
        max_residual: max_message_residual(graph),
    };

    info!(
        "Finished running engine in {:?}. Total updates: {}. Efficiency: {:.0} updates per second. Converged: {}. Max residual: {:e}.",
        report.elapsed,
        report.updates,
        report.updates_per_second(),
        report.converged,
        report.max_residual
    );
    if report.failed_updates > 0 {
        warn!("{} updates were aborted.", report.failed_updates);
    }

    Ok(report)
}

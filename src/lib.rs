pub mod errors;

pub mod factor_types {
    pub mod binary_factor;
    pub mod unary_factor;
}

pub mod mrf {
    pub mod builder;
    pub mod graph;
    pub mod image;
}

pub mod engine {
    pub mod bp_update;
    pub mod options;
    pub mod run;
    pub mod scheduler;
    pub mod shared_data;
    pub mod splash;
}

pub use engine::{
    bp_update::{bp_update, UpdateScratch},
    options::{EngineOptions, SchedulerType},
    run::{run, RunReport},
    scheduler::Scheduler,
    shared_data::SharedData,
};
pub use errors::BPError;
pub use factor_types::{
    binary_factor::{BinaryFactor, Smoothing},
    unary_factor::UnaryFactor,
};
pub use mrf::{
    builder::{construct_graph, Mrf},
    graph::{EdgeData, MrfGraph, VertexData},
    image::{Image, PredictionType},
};

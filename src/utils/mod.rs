pub mod config;
pub mod dataset;
pub mod error;
pub mod mat;
pub mod nn_trait;

pub mod batches;
pub mod linear;
pub mod measure;
pub mod network;
pub mod optimizer;
pub mod trainer;

pub mod misc;

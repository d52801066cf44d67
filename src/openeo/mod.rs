//! Minimal openEO client: process graph building, connection and batch jobs.

pub mod client;
pub mod datacube;
pub mod error;
pub mod graph;
pub mod job;
pub mod udf;

pub use client::{Connection, JobSpec};
pub use datacube::{DataCube, VectorCube};
pub use error::OpenEoError;
pub use graph::{Argument, FlatGraph, Parameter, build_process_dict};
pub use udf::Udf;

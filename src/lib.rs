pub mod cache;
pub mod cnf;
pub mod config;
pub mod constraint;
pub mod data;
pub mod encoder;
pub mod error;
pub mod facade;
pub mod grouper;
pub mod io;
pub mod model;
pub mod packing;
pub mod pool;
pub mod result;
pub mod sat;
pub mod solver;
pub mod termination;
pub mod types;

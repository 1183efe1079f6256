pub mod worker;

pub use worker::{run_worker, WorkerConfig};

pub mod executor;

pub use executor::BatchExecutor;

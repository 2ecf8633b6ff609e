pub mod executor;
pub mod worker;

pub use executor::{DataSourceItem, DataSourceOutcome, ExecutionOutcome, RequestDataSource, RequestExecutor};
pub use worker::WorkerPool;

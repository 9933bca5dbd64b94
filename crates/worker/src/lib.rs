mod status;
pub use status::RequestStatus;

mod process;

mod worker;
pub use worker::{ExtractionWorker, WorkerHandle};

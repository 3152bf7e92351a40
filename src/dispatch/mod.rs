mod orchestrator;
mod worker;

pub use orchestrator::Dispatcher;
pub use worker::ExtractionWorker;

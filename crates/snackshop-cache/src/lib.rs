pub mod controller;
pub mod fetcher;
pub mod generation;
pub mod offline;
pub mod store;
pub mod worker;

pub use controller::{CacheController, ResourceClass, Response, ResponseSource, classify};
pub use fetcher::{Fetch, FetchError, FetchRequest, FetchedResponse, HttpFetcher};
pub use generation::{Generation, GenerationPhase};
pub use store::{CacheStore, StoredResponse};
pub use worker::{CacheWorkerHandle, WorkerCommand, WorkerEvent};

#[cfg(test)]
pub(crate) mod test_support;

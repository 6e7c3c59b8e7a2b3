//! Shared services used by the API server and the CLI

mod publication_store;

pub use publication_store::PublicationStore;

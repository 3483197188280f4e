// Library interface for the watcher modules
// This allows tests and the binary to import modules

pub mod delivery;
pub mod digest;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod scraping;
pub mod selection;
pub mod storage;

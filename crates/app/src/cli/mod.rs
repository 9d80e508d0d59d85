pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Files, Ingest, Init, Publish, ReadKey, Serve, Subscribe, Unsubscribe, Version};

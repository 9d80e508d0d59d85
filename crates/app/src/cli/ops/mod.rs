pub mod files;
pub mod ingest;
pub mod init;
pub mod publish;
pub mod read_key;
pub mod serve;
pub mod subscribe;
pub mod version;

pub use files::Files;
pub use ingest::Ingest;
pub use init::Init;
pub use publish::Publish;
pub use read_key::ReadKey;
pub use serve::Serve;
pub use subscribe::{Subscribe, Unsubscribe};
pub use version::Version;

pub mod analysis;
pub mod blocklist;
pub mod cache;
pub mod feed;

pub use analysis::AnalysisStore;
pub use blocklist::BlocklistStore;
pub use cache::CacheStore;

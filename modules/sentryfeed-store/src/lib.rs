pub mod store;

pub use store::{ArticleWrite, SimhashCandidate, SourceStats, Store};

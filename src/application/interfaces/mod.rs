mod embedding_provider;
mod stores;

pub use embedding_provider::*;
pub use stores::*;

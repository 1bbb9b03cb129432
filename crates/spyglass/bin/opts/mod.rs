mod artifacts;
mod cache;
mod rpc;

pub use artifacts::ArtifactsOpts;
pub use cache::CacheOpts;
pub use rpc::{NodeProvider, RpcOpts};

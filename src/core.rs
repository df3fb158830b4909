pub mod node;
pub mod types;

pub use node::ChainClient;
pub use node::Node;
pub use node::NodeError;

#[cfg(feature = "test-utilities")]
pub use node::MockNode;

mod consumer;
mod dispatcher;
mod processor;
pub mod queue;
pub mod store;
pub mod types;

pub use consumer::Consumer;
pub use dispatcher::Dispatcher;
pub use processor::Outcome;
pub use processor::ProcessError;
pub use processor::Processed;
pub use processor::SkipReason;
pub use processor::TaskHandler;
pub use processor::TaskProcessor;
pub use queue::MemoryBroker;
pub use queue::MessageQueue;
pub use queue::QueueName;
pub use store::TaskStore;
pub use types::NewTask;
pub use types::ProcessingTask;
pub use types::TaskKind;
pub use types::TaskMessage;
pub use types::TaskStatus;

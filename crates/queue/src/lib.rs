mod item;
pub use item::{ItemCodec, QueueItem};

mod group_queue;
pub use group_queue::{GroupQueueConfig, GroupQueueManager, QueueStats};

mod buffer;
pub use buffer::ConversationBuffer;

mod lock;
pub use lock::{GroupLock, LockGuard};

mod consumer;
pub use consumer::QueueConsumer;

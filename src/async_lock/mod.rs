mod lock;
mod manager;
mod memory_store;
mod operations;
mod registry;
mod renewer;
mod store;


pub use lock::*;
pub use manager::*;
pub use memory_store::*;
pub use operations::RedisStore;
pub use store::LockStore;

//! Chain call submission, serialized per chain client

mod lock;
mod sender;

pub use lock::TransactionLock;
pub use sender::{NativeSender, PortalSender, TransactionSender};

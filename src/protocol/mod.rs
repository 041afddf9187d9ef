//! Wire protocol: colon-delimited request text, token or batch replies.
//!
//! - `request`: tagged request type decoded once at the boundary
//! - `reply`: reply tokens and the batch reply
//! - `batch`: task batches and their JSON encoding

pub mod batch;
pub mod reply;
pub mod request;

pub use batch::TaskBatch;
pub use reply::Reply;
pub use request::{Request, is_valid_worker_id};

pub mod scheduler;
pub mod store;

pub use scheduler::sweep;
pub use store::{
    StoreError, clear_failure, compute_backoff_secs, due_failures, find_by_key, record_failure,
};

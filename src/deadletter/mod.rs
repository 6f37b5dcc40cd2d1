pub mod store;

pub use store::{
    DeadLetterCursor, ListDeadLettersParams, ListDeadLettersResult, StoreError, get_entry,
    list_entries, resolve_entry, unresolved_count,
};

pub mod store;

pub use store::{
    StoreError, channel_sync_token, claim_for_processing, get_raw_event, insert_raw_event,
    latest_for_meeting, mark_failed, mark_processed, requeue_stale, save_channel_sync_token,
};

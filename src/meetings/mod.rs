pub mod store;

pub use store::{
    MeetingUpsert, StoreError, begin_processing, find_by_external_id, get_meeting, get_transcript,
    mark_failed, mark_ready, record_draft, resume_failed, set_processing_step, upsert_meeting,
    upsert_transcript,
};

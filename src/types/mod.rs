pub mod dead_letter;
pub mod failure;
pub mod meeting;
pub mod ops;
pub mod platform;
pub mod raw_event;
pub mod transcript;

#[allow(unused_imports)]
pub use dead_letter::DeadLetterEntry;
#[allow(unused_imports)]
pub use failure::{FailureAttempt, WebhookFailure, WebhookFailureStatus};
#[allow(unused_imports)]
pub use meeting::{Meeting, MeetingStatus};
#[allow(unused_imports)]
pub use ops::{
    HealthResponse, HealthStatus, ListDeadLettersResponse, MetricsResponse, PlatformFailureRate,
    ReprocessAction, ReprocessResponse, ResolveDeadLetterRequest, ResolveDeadLetterResponse,
    SweepSummary, WebhookAck,
};
#[allow(unused_imports)]
pub use platform::Platform;
#[allow(unused_imports)]
pub use raw_event::{RawEvent, RawEventStatus};
#[allow(unused_imports)]
pub use transcript::{Transcript, TranscriptFormat, TranscriptSegment, TranscriptStatus};

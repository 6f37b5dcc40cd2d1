pub mod ops;
pub mod reprocess;
pub mod webhooks;

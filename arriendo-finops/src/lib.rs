pub mod billing_period;
pub mod events;
pub mod jobs;
pub mod logger;
pub mod reconciliation;
pub mod settings;
pub mod store;

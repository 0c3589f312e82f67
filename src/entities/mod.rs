pub mod campaigns;
pub mod daily_aggregates;
pub mod integration_jobs;
pub mod integrations;
pub mod prize_codes;
pub mod prizes;
pub mod raw_events;
pub mod submissions;

pub use campaigns as campaign_entity;
pub use daily_aggregates as daily_aggregate_entity;
pub use integration_jobs as integration_job_entity;
pub use integrations as integration_entity;
pub use prize_codes as prize_code_entity;
pub use prizes as prize_entity;
pub use raw_events as raw_event_entity;
pub use submissions as submission_entity;

pub use integration_jobs::JobStatus;
pub use integrations::IntegrationKind;
pub use prize_codes::PrizeCodeStatus;
pub use raw_events::EventKind;

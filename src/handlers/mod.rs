pub mod admin;
pub mod claim;
pub mod cron;
pub mod ingest;
pub mod jobs;

pub use admin::admin_config;
pub use claim::claim_config;
pub use cron::cron_config;
pub use ingest::ingest_config;
pub use jobs::jobs_config;

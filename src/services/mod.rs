pub mod aggregation_service;
pub mod ingestion_service;
pub mod job_service;
pub mod orchestrator_service;
pub mod prize_service;

pub use aggregation_service::*;
pub use ingestion_service::*;
pub use job_service::*;
pub use orchestrator_service::*;
pub use prize_service::*;

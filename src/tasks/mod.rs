//! Background scheduled tasks for the application.
//!
//! This module centralizes the recurring pipeline stages (event aggregation,
//! event orchestration, and integration job dispatch). Call `spawn_all` once
//! during startup to launch them. Deployments that rely on the external cron
//! endpoints instead set `pipeline.spawn_schedulers = false` and skip this.

use crate::config::PipelineConfig;
use crate::services::{AggregationService, JobService, OrchestratorService};

/// Spawn all background tasks.
///
/// Notes
/// - Each stage is idempotent as implemented in its service, so the loops can
///   coexist with manual cron triggers without double-processing.
/// - This function detaches tasks via `tokio::spawn`; it does not block.
pub fn spawn_all(
    aggregation_service: AggregationService,
    orchestrator_service: OrchestratorService,
    job_service: JobService,
    pipeline: &PipelineConfig,
) {
    // 聚合: 未聚合事件折叠进日计数器
    {
        let svc = aggregation_service.clone();
        let interval = pipeline.aggregation_interval_secs;
        tokio::spawn(async move {
            loop {
                match svc.drain().await {
                    Ok(o) if o.processed > 0 || o.failed > 0 => {
                        log::info!("Aggregation tick: {} events, {} failed", o.processed, o.failed)
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Aggregation tick failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            }
        });
    }

    // 编排: 未处理事件路由到奖品分配与集成 job
    {
        let svc = orchestrator_service.clone();
        let interval = pipeline.orchestrator_interval_secs;
        tokio::spawn(async move {
            loop {
                match svc.drain().await {
                    Ok(o) if o.processed > 0 || o.failed > 0 => {
                        log::info!(
                            "Orchestrator tick: {} events, {} failed",
                            o.processed,
                            o.failed
                        )
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Orchestrator tick failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            }
        });
    }

    // 派发: 回收僵死 running, 再执行到期 job
    {
        let svc = job_service.clone();
        let interval = pipeline.dispatch_interval_secs;
        tokio::spawn(async move {
            loop {
                if let Err(e) = svc.reclaim_stale().await {
                    log::error!("Stale job reclaim failed: {e:?}");
                }
                match svc.run_due().await {
                    Ok(o) if o.processed > 0 || o.failed > 0 => {
                        log::info!("Dispatch tick: {} jobs, {} failed", o.processed, o.failed)
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Dispatch tick failed: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            }
        });
    }
}

use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter

use popspin_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{EspClient, WebhookClient},
    handlers,
    middlewares::create_cors,
    services::{
        AggregationService, IngestionService, JobService, OrchestratorService, PrizeService,
    },
    swagger::swagger_config,
    tasks,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // 出站客户端
    let webhook_client = WebhookClient::new(&config.outbound);
    let esp_client = EspClient::new(&config.outbound);

    // 创建服务
    let pipeline = config.pipeline.clone();
    let ingestion_service = IngestionService::new(pool.clone());
    let prize_service = PrizeService::new(pool.clone());
    let aggregation_service = AggregationService::new(
        pool.clone(),
        pipeline.aggregation_batch_size,
        pipeline.max_batches,
    );
    let job_service = JobService::new(
        pool.clone(),
        webhook_client,
        esp_client,
        pipeline.dispatch_batch_size,
        pipeline.default_max_attempts,
        pipeline.stale_running_secs,
    );
    let orchestrator_service = OrchestratorService::new(
        pool.clone(),
        prize_service.clone(),
        job_service.clone(),
        pipeline.orchestrator_batch_size,
        pipeline.max_batches,
    );

    // 内置调度循环; 纯外部 cron 部署下关闭
    if pipeline.spawn_schedulers {
        tasks::spawn_all(
            aggregation_service.clone(),
            orchestrator_service.clone(),
            job_service.clone(),
            &pipeline,
        );
    }

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(ingestion_service.clone()))
            .app_data(web::Data::new(prize_service.clone()))
            .app_data(web::Data::new(aggregation_service.clone()))
            .app_data(web::Data::new(orchestrator_service.clone()))
            .app_data(web::Data::new(job_service.clone()))
            .configure(swagger_config)
            .configure(handlers::cron_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::ingest_config)
                    .configure(handlers::claim_config)
                    .configure(handlers::jobs_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((server_host.as_str(), server_port))?
    .run()
    .await
}

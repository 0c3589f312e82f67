use sea_orm_migration::prelude::*;

/// Campaigns (read model maintained by the campaign builder; the pipeline
/// only resolves events against it)
#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    TenantId,
    Name,
    IsActive,
    CreatedAt,
}

/// Integrations (webhook endpoints and ESP providers receiving side effects)
#[derive(DeriveIden)]
enum Integrations {
    Table,
    Id,
    TenantId,
    CampaignId,
    Kind,
    Name,
    Config,
    IsActive,
    LastSyncAt,
    CreatedAt,
    UpdatedAt,
}

/// Raw Events (append-only interaction log, the pipeline's source of truth)
#[derive(DeriveIden)]
enum RawEvents {
    Table,
    Id,
    TenantId,
    CampaignId,
    SessionId,
    Kind,
    OccurredAt,
    Payload,
    Aggregated,
    Processed,
    CreatedAt,
}

/// Daily Aggregates (per tenant/campaign/day counters)
#[derive(DeriveIden)]
enum DailyAggregates {
    Table,
    Id,
    TenantId,
    CampaignId,
    Day,
    Impressions,
    Opens,
    GameStarts,
    GameFinishes,
    FormSubmits,
    PrizesWon,
    CtaClicks,
    CreatedAt,
    UpdatedAt,
}

/// Prizes (weighted reward definitions per campaign)
#[derive(DeriveIden)]
enum Prizes {
    Table,
    Id,
    CampaignId,
    Name,
    WeightBp,
    Quantity,
    Claimed,
    IsConsolation,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// Prize Codes (finite coupon inventory backing a prize)
#[derive(DeriveIden)]
enum PrizeCodes {
    Table,
    Id,
    PrizeId,
    Code,
    Status,
    ClaimedAt,
    CreatedAt,
}

/// Submissions (one participant's lead-capture record per session)
#[derive(DeriveIden)]
enum Submissions {
    Table,
    Id,
    TenantId,
    CampaignId,
    SessionId,
    Email,
    Name,
    Consent,
    FormData,
    PrizeName,
    PrizeCode,
    CreatedAt,
    UpdatedAt,
}

/// Integration Jobs (retrying side-effect queue)
#[derive(DeriveIden)]
enum IntegrationJobs {
    Table,
    Id,
    IntegrationId,
    JobType,
    Payload,
    Status,
    Attempts,
    MaxAttempts,
    ScheduledFor,
    StartedAt,
    CompletedAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Schema notes:
/// - prize weights are basis points (100% = 10000bp)
/// - prizes.quantity NULL means unlimited; claimed must never exceed quantity
/// - prize_codes are unique per (prize_id, code); bulk import relies on this
///   constraint for storage-level de-duplication
/// - raw_events carries two consumption flags: `aggregated` is owned by the
///   aggregation worker, `processed` by the orchestrator
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Campaigns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Campaigns::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Campaigns::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Campaigns::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Campaigns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_campaigns_tenant")
                    .table(Campaigns::Table)
                    .col(Campaigns::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Integrations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Integrations::CampaignId).uuid().null())
                    .col(ColumnDef::new(Integrations::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(Integrations::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Integrations::Config).json_binary().not_null())
                    .col(
                        ColumnDef::new(Integrations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Integrations::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_integrations_campaign")
                    .table(Integrations::Table)
                    .col(Integrations::CampaignId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RawEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RawEvents::TenantId).uuid().not_null())
                    .col(ColumnDef::new(RawEvents::CampaignId).uuid().not_null())
                    .col(ColumnDef::new(RawEvents::SessionId).string_len(64).not_null())
                    .col(ColumnDef::new(RawEvents::Kind).string_len(32).not_null())
                    .col(
                        ColumnDef::new(RawEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RawEvents::Payload).json_binary().null())
                    .col(
                        ColumnDef::new(RawEvents::Aggregated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RawEvents::Processed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RawEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // 两个消费游标分别走各自的部分索引扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raw_events_aggregated_occurred")
                    .table(RawEvents::Table)
                    .col(RawEvents::Aggregated)
                    .col(RawEvents::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_raw_events_processed_occurred")
                    .table(RawEvents::Table)
                    .col(RawEvents::Processed)
                    .col(RawEvents::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DailyAggregates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DailyAggregates::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DailyAggregates::TenantId).uuid().not_null())
                    .col(ColumnDef::new(DailyAggregates::CampaignId).uuid().not_null())
                    .col(ColumnDef::new(DailyAggregates::Day).date().not_null())
                    .col(
                        ColumnDef::new(DailyAggregates::Impressions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::Opens)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::GameStarts)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::GameFinishes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::FormSubmits)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::PrizesWon)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::CtaClicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(DailyAggregates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // 一个 (tenant, campaign, day) 只允许一行计数
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_daily_aggregates_key_unique")
                    .table(DailyAggregates::Table)
                    .col(DailyAggregates::TenantId)
                    .col(DailyAggregates::CampaignId)
                    .col(DailyAggregates::Day)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Prizes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Prizes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Prizes::CampaignId).uuid().not_null())
                    .col(ColumnDef::new(Prizes::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Prizes::WeightBp).integer().not_null())
                    .col(ColumnDef::new(Prizes::Quantity).big_integer().null())
                    .col(
                        ColumnDef::new(Prizes::Claimed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Prizes::IsConsolation)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Prizes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Prizes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Prizes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_prizes_campaign")
                    .table(Prizes::Table)
                    .col(Prizes::CampaignId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PrizeCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PrizeCodes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PrizeCodes::PrizeId).uuid().not_null())
                    .col(ColumnDef::new(PrizeCodes::Code).string_len(64).not_null())
                    .col(
                        ColumnDef::new(PrizeCodes::Status)
                            .string_len(16)
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(PrizeCodes::ClaimedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PrizeCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // code 在奖品命名空间内唯一，批量导入依赖该约束去重
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_prize_codes_prize_code_unique")
                    .table(PrizeCodes::Table)
                    .col(PrizeCodes::PrizeId)
                    .col(PrizeCodes::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_prize_codes_prize_status")
                    .table(PrizeCodes::Table)
                    .col(PrizeCodes::PrizeId)
                    .col(PrizeCodes::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Submissions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Submissions::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Submissions::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Submissions::CampaignId).uuid().not_null())
                    .col(
                        ColumnDef::new(Submissions::SessionId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Submissions::Email).string_len(255).null())
                    .col(ColumnDef::new(Submissions::Name).string_len(255).null())
                    .col(
                        ColumnDef::new(Submissions::Consent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Submissions::FormData).json_binary().null())
                    .col(ColumnDef::new(Submissions::PrizeName).string_len(255).null())
                    .col(ColumnDef::new(Submissions::PrizeCode).string_len(64).null())
                    .col(
                        ColumnDef::new(Submissions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Submissions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_submissions_session")
                    .table(Submissions::Table)
                    .col(Submissions::SessionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IntegrationJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntegrationJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IntegrationJobs::IntegrationId).uuid().not_null())
                    .col(
                        ColumnDef::new(IntegrationJobs::JobType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::ScheduledFor)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(IntegrationJobs::LastError).text().null())
                    .col(
                        ColumnDef::new(IntegrationJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(IntegrationJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_integration_jobs_status_scheduled")
                    .table(IntegrationJobs::Table)
                    .col(IntegrationJobs::Status)
                    .col(IntegrationJobs::ScheduledFor)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IntegrationJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Submissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PrizeCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Prizes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DailyAggregates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RawEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await?;
        Ok(())
    }
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db_backend = manager.get_database_backend();

        if db_backend == sea_orm::DatabaseBackend::Sqlite {
            // SQLite-compatible version using TEXT for UUID columns
            manager
                .create_table(
                    Table::create()
                        .table(Client::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Client::UserId).text().not_null().primary_key())
                        .col(ColumnDef::new(Client::Email).string().null())
                        .col(ColumnDef::new(Client::GoogleCalendarId).string().null())
                        .col(ColumnDef::new(Client::GoogleRefreshToken).string().null())
                        .col(ColumnDef::new(Client::GoogleConnectedAt).timestamp().null())
                        .col(ColumnDef::new(Client::SquareMerchantId).string().null())
                        .col(ColumnDef::new(Client::SquareAccessToken).string().null())
                        .col(ColumnDef::new(Client::SquareRefreshToken).string().null())
                        .col(ColumnDef::new(Client::SquareExpiresAt).timestamp().null())
                        .col(ColumnDef::new(Client::SquareConnectedAt).timestamp().null())
                        .col(ColumnDef::new(Client::SquarePaymentLink).string().null())
                        .col(ColumnDef::new(Client::StripeAccountId).string().null())
                        .col(
                            ColumnDef::new(Client::StripeOnboardingComplete)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Client::StripeConnectedAt).timestamp().null())
                        .col(ColumnDef::new(Client::ChatbotKey).string().null())
                        .col(ColumnDef::new(Client::ChatbotUrl).string().null())
                        .col(
                            ColumnDef::new(Client::CreatedAt)
                                .timestamp()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(
                            ColumnDef::new(Client::UpdatedAt)
                                .timestamp()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;
        } else {
            // PostgreSQL version with proper UUID and timestamptz support
            manager
                .create_table(
                    Table::create()
                        .table(Client::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Client::UserId).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Client::Email).string().null())
                        .col(ColumnDef::new(Client::GoogleCalendarId).string().null())
                        .col(ColumnDef::new(Client::GoogleRefreshToken).string().null())
                        .col(
                            ColumnDef::new(Client::GoogleConnectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Client::SquareMerchantId).string().null())
                        .col(ColumnDef::new(Client::SquareAccessToken).string().null())
                        .col(ColumnDef::new(Client::SquareRefreshToken).string().null())
                        .col(
                            ColumnDef::new(Client::SquareExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Client::SquareConnectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Client::SquarePaymentLink).string().null())
                        .col(ColumnDef::new(Client::StripeAccountId).string().null())
                        .col(
                            ColumnDef::new(Client::StripeOnboardingComplete)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Client::StripeConnectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Client::ChatbotKey).string().null())
                        .col(ColumnDef::new(Client::ChatbotUrl).string().null())
                        .col(
                            ColumnDef::new(Client::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .col(
                            ColumnDef::new(Client::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .to_owned(),
                )
                .await?;
        }

        // Webhook events resolve their owner through this column
        manager
            .create_index(
                Index::create()
                    .name("idx_clients_square_merchant_id")
                    .table(Client::Table)
                    .col(Client::SquareMerchantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Client::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Client {
    #[sea_orm(iden = "clients")]
    Table,
    UserId,
    Email,
    GoogleCalendarId,
    GoogleRefreshToken,
    GoogleConnectedAt,
    SquareMerchantId,
    SquareAccessToken,
    SquareRefreshToken,
    SquareExpiresAt,
    SquareConnectedAt,
    SquarePaymentLink,
    StripeAccountId,
    StripeOnboardingComplete,
    StripeConnectedAt,
    ChatbotKey,
    ChatbotUrl,
    CreatedAt,
    UpdatedAt,
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BrokerMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BrokerMessages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BrokerMessages::Subject).string().not_null())
                    .col(ColumnDef::new(BrokerMessages::Payload).text().not_null())
                    .col(
                        ColumnDef::new(BrokerMessages::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(BrokerMessages::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BrokerMessages::ClaimedBy).string())
                    .col(ColumnDef::new(BrokerMessages::ClaimToken).string())
                    .col(ColumnDef::new(BrokerMessages::ClaimedUntil).timestamp())
                    .col(ColumnDef::new(BrokerMessages::LastError).text())
                    .col(ColumnDef::new(BrokerMessages::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(BrokerMessages::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Pull scans by subject and status in id order.
        manager
            .create_index(
                Index::create()
                    .name("idx_broker_messages_subject_status")
                    .table(BrokerMessages::Table)
                    .col(BrokerMessages::Subject)
                    .col(BrokerMessages::Status)
                    .col(BrokerMessages::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_broker_messages_claim_token")
                    .table(BrokerMessages::Table)
                    .col(BrokerMessages::ClaimToken)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BrokerMessages::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum BrokerMessages {
    Table,
    Id,
    Subject,
    Payload,
    Status,
    Attempts,
    ClaimedBy,
    ClaimToken,
    ClaimedUntil,
    LastError,
    CreatedAt,
    UpdatedAt,
}

use sea_orm::Statement;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// sea-query cannot express partial indexes, so these go in as raw SQL.
const PARTIAL_UNIQUE_INDEXES: [&str; 3] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_comics_number ON comics (number) WHERE number IS NOT NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_comics_extra_slug ON comics (slug) WHERE number IS NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_translations_published_language \
     ON translations (comic_id, language) WHERE is_draft = 0",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Comics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Comics::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Comics::Number).integer())
                    .col(ColumnDef::new(Comics::Slug).string().not_null())
                    .col(ColumnDef::new(Comics::PublicationDate).date().not_null())
                    .col(ColumnDef::new(Comics::ExplainUrl).string())
                    .col(ColumnDef::new(Comics::ClickUrl).string())
                    .col(
                        ColumnDef::new(Comics::IsInteractive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Comics::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Comics::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Translations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Translations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Translations::ComicId).integer().not_null())
                    .col(ColumnDef::new(Translations::Language).string_len(2).not_null())
                    .col(ColumnDef::new(Translations::Title).string().not_null())
                    .col(
                        ColumnDef::new(Translations::Tooltip)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Translations::RawTranscript)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Translations::TranslatorComment)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Translations::SourceUrl).string())
                    .col(
                        ColumnDef::new(Translations::IsDraft)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Translations::SearchableText)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Translations::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Translations::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_translations_comic_id")
                            .from(Translations::Table, Translations::ComicId)
                            .to(Comics::Table, Comics::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_translations_comic_id_language")
                    .table(Translations::Table)
                    .col(Translations::ComicId)
                    .col(Translations::Language)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tags::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tags::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tags::Name).string().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ComicTags::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ComicTags::ComicId).integer().not_null())
                    .col(ColumnDef::new(ComicTags::TagId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(ComicTags::ComicId)
                            .col(ComicTags::TagId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comic_tags_comic_id")
                            .from(ComicTags::Table, ComicTags::ComicId)
                            .to(Comics::Table, Comics::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comic_tags_tag_id")
                            .from(ComicTags::Table, ComicTags::TagId)
                            .to(Tags::Table, Tags::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TranslationImages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TranslationImages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TranslationImages::TranslationId).integer())
                    .col(ColumnDef::new(TranslationImages::Original).string().not_null())
                    .col(ColumnDef::new(TranslationImages::Converted).string())
                    .col(ColumnDef::new(TranslationImages::Thumbnail).string())
                    .col(
                        ColumnDef::new(TranslationImages::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TranslationImages::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_translation_images_translation_id")
                            .from(TranslationImages::Table, TranslationImages::TranslationId)
                            .to(Translations::Table, Translations::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_translation_images_translation_id")
                    .table(TranslationImages::Table)
                    .col(TranslationImages::TranslationId)
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();
        let backend = manager.get_database_backend();
        for sql in PARTIAL_UNIQUE_INDEXES {
            db.execute(Statement::from_string(backend, sql.to_string()))
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TranslationImages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ComicTags::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tags::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Translations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Comics::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum Comics {
    Table,
    Id,
    Number,
    Slug,
    PublicationDate,
    ExplainUrl,
    ClickUrl,
    IsInteractive,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Translations {
    Table,
    Id,
    ComicId,
    Language,
    Title,
    Tooltip,
    RawTranscript,
    TranslatorComment,
    SourceUrl,
    IsDraft,
    SearchableText,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Tags {
    Table,
    Id,
    Name,
}

#[derive(Iden)]
enum ComicTags {
    Table,
    ComicId,
    TagId,
}

#[derive(Iden)]
enum TranslationImages {
    Table,
    Id,
    TranslationId,
    Original,
    Converted,
    Thumbnail,
    CreatedAt,
    UpdatedAt,
}

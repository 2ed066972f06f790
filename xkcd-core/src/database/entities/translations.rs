use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "translations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub comic_id: i32,
    pub language: String,
    pub title: String,
    pub tooltip: String,
    #[sea_orm(column_type = "Text")]
    pub raw_transcript: String,
    #[sea_orm(column_type = "Text")]
    pub translator_comment: String,
    pub source_url: Option<String>,
    pub is_draft: bool,
    /// Denormalised concatenation of the textual fields, matched by list search.
    #[sea_orm(column_type = "Text")]
    pub searchable_text: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::comics::Entity",
        from = "Column::ComicId",
        to = "super::comics::Column::Id",
        on_delete = "Cascade"
    )]
    Comic,
    #[sea_orm(has_many = "super::translation_images::Entity")]
    Images,
}

impl Related<super::comics::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comic.def()
    }
}

impl Related<super::translation_images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            comic_id: ActiveValue::NotSet,
            language: ActiveValue::NotSet,
            title: ActiveValue::NotSet,
            tooltip: Set(String::new()),
            raw_transcript: Set(String::new()),
            translator_comment: Set(String::new()),
            source_url: ActiveValue::NotSet,
            is_draft: Set(false),
            searchable_text: Set(String::new()),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
        }
    }

    pub fn set_updated_at(mut self) -> Self {
        self.updated_at = Set(chrono::Utc::now());
        self
    }
}

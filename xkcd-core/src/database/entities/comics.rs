use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Public issue number; `None` marks an extra comic identified by `slug`.
    pub number: Option<i32>,
    pub slug: String,
    pub publication_date: Date,
    pub explain_url: Option<String>,
    pub click_url: Option<String>,
    pub is_interactive: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::translations::Entity")]
    Translations,
    #[sea_orm(has_many = "super::comic_tags::Entity")]
    ComicTags,
}

impl Related<super::translations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Translations.def()
    }
}

impl Related<super::comic_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComicTags.def()
    }
}

impl Related<super::tags::Entity> for Entity {
    fn to() -> RelationDef {
        super::comic_tags::Relation::Tag.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::comic_tags::Relation::Comic.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            number: ActiveValue::NotSet,
            slug: ActiveValue::NotSet,
            publication_date: ActiveValue::NotSet,
            explain_url: ActiveValue::NotSet,
            click_url: ActiveValue::NotSet,
            is_interactive: Set(false),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
        }
    }

    pub fn set_updated_at(mut self) -> Self {
        self.updated_at = Set(chrono::Utc::now());
        self
    }
}

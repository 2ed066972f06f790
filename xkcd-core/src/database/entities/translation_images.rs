use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Image record. Paths are relative to the storage root.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "translation_images")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Owning translation; `None` while unattached or after the owner was deleted.
    pub translation_id: Option<i32>,
    pub original: String,
    pub converted: Option<String>,
    pub thumbnail: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::translations::Entity",
        from = "Column::TranslationId",
        to = "super::translations::Column::Id",
        on_delete = "SetNull"
    )]
    Translation,
}

impl Related<super::translations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Translation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            translation_id: Set(None),
            original: ActiveValue::NotSet,
            converted: Set(None),
            thumbnail: Set(None),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
        }
    }
}

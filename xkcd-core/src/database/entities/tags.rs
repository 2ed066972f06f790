use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::comic_tags::Entity")]
    ComicTags,
}

impl Related<super::comic_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComicTags.def()
    }
}

impl Related<super::comics::Entity> for Entity {
    fn to() -> RelationDef {
        super::comic_tags::Relation::Comic.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::comic_tags::Relation::Tag.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

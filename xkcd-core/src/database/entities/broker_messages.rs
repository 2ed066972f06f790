use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_FLIGHT: &str = "in_flight";
pub const STATUS_ACKED: &str = "acked";
pub const STATUS_DEAD: &str = "dead";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "broker_messages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub status: String,
    /// Number of times the message has been handed to a consumer.
    pub attempts: i32,
    pub claimed_by: Option<String>,
    pub claim_token: Option<String>,
    pub claimed_until: Option<ChronoDateTimeUtc>,
    pub last_error: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            subject: ActiveValue::NotSet,
            payload: ActiveValue::NotSet,
            status: Set(STATUS_PENDING.to_string()),
            attempts: Set(0),
            claimed_by: Set(None),
            claim_token: Set(None),
            claimed_until: Set(None),
            last_error: Set(None),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
        }
    }
}

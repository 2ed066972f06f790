//! Work queue backed by the `broker_messages` table.
//!
//! Each subject is a single consumer group. Claims are made with one
//! conditional `UPDATE` stamped with a fresh claim token, then read back by that
//! token, so two pullers (in one process or several sharing the database file)
//! never hold the same message at once.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Delivery, MessageBroker};
use crate::database::entities::broker_messages::{
    self, STATUS_ACKED, STATUS_DEAD, STATUS_IN_FLIGHT, STATUS_PENDING,
};
use crate::errors::{BrokerError, BrokerResult};

#[derive(Clone)]
pub struct SqlBroker {
    db: DatabaseConnection,
    max_deliveries: i32,
}

impl SqlBroker {
    pub fn new(db: DatabaseConnection, max_deliveries: i32) -> Self {
        Self {
            db,
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Deletes acked and dead messages last touched before `older_than` ago.
    pub async fn prune(&self, older_than: Duration) -> BrokerResult<u64> {
        let cutoff = Utc::now() - to_chrono(older_than);
        let result = broker_messages::Entity::delete_many()
            .filter(broker_messages::Column::Status.is_in([STATUS_ACKED, STATUS_DEAD]))
            .filter(broker_messages::Column::UpdatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            debug!(removed = result.rows_affected, "pruned broker messages");
        }
        Ok(result.rows_affected)
    }

    pub async fn count(&self, subject: &str, status: &str) -> BrokerResult<u64> {
        let count = broker_messages::Entity::find()
            .filter(broker_messages::Column::Subject.eq(subject))
            .filter(broker_messages::Column::Status.eq(status))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    /// Settles a message only while `delivery` still holds its claim.
    async fn settle(
        &self,
        delivery: &Delivery,
        status: &str,
        reason: Option<&str>,
    ) -> BrokerResult<()> {
        let mut update = broker_messages::Entity::update_many()
            .col_expr(broker_messages::Column::Status, Expr::value(status))
            .col_expr(
                broker_messages::Column::ClaimToken,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                broker_messages::Column::ClaimedUntil,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .col_expr(broker_messages::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(reason) = reason {
            update = update.col_expr(
                broker_messages::Column::LastError,
                Expr::value(reason.to_string()),
            );
        }

        let result = update
            .filter(broker_messages::Column::Id.eq(delivery.id))
            .filter(broker_messages::Column::ClaimToken.eq(delivery.claim_token.as_str()))
            .filter(broker_messages::Column::Status.eq(STATUS_IN_FLIGHT))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            return Ok(());
        }

        let exists = broker_messages::Entity::find_by_id(delivery.id)
            .one(&self.db)
            .await?
            .is_some();
        if exists {
            Err(BrokerError::LeaseLost(delivery.id))
        } else {
            Err(BrokerError::MessageNotFound(delivery.id))
        }
    }

    /// Expired claims that already used every delivery go straight to dead.
    async fn bury_exhausted(&self, subject: &str) -> BrokerResult<()> {
        let now = Utc::now();
        let result = broker_messages::Entity::update_many()
            .col_expr(broker_messages::Column::Status, Expr::value(STATUS_DEAD))
            .col_expr(
                broker_messages::Column::LastError,
                Expr::value("lease expired on final delivery"),
            )
            .col_expr(broker_messages::Column::UpdatedAt, Expr::value(now))
            .filter(broker_messages::Column::Subject.eq(subject))
            .filter(broker_messages::Column::Status.eq(STATUS_IN_FLIGHT))
            .filter(broker_messages::Column::ClaimedUntil.lt(now))
            .filter(broker_messages::Column::Attempts.gte(self.max_deliveries))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            warn!(
                subject,
                count = result.rows_affected,
                "dead-lettered messages whose final lease expired"
            );
        }
        Ok(())
    }
}

fn claimable(now: chrono::DateTime<Utc>) -> Condition {
    Condition::any()
        .add(broker_messages::Column::Status.eq(STATUS_PENDING))
        .add(
            Condition::all()
                .add(broker_messages::Column::Status.eq(STATUS_IN_FLIGHT))
                .add(broker_messages::Column::ClaimedUntil.lt(now)),
        )
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl MessageBroker for SqlBroker {
    async fn publish(&self, subject: &str, payload: &str) -> BrokerResult<i64> {
        let mut message = broker_messages::ActiveModel::new();
        message.subject = Set(subject.to_string());
        message.payload = Set(payload.to_string());

        let inserted = broker_messages::Entity::insert(message)
            .exec(&self.db)
            .await?;
        Ok(inserted.last_insert_id)
    }

    async fn pull(
        &self,
        subject: &str,
        consumer: &str,
        batch: u64,
        lease: Duration,
    ) -> BrokerResult<Vec<Delivery>> {
        self.bury_exhausted(subject).await?;

        let now = Utc::now();
        let candidates: Vec<i64> = broker_messages::Entity::find()
            .select_only()
            .column(broker_messages::Column::Id)
            .filter(broker_messages::Column::Subject.eq(subject))
            .filter(claimable(now))
            .order_by_asc(broker_messages::Column::Id)
            .limit(batch)
            .into_tuple()
            .all(&self.db)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let token = Uuid::new_v4().to_string();
        broker_messages::Entity::update_many()
            .col_expr(broker_messages::Column::Status, Expr::value(STATUS_IN_FLIGHT))
            .col_expr(
                broker_messages::Column::ClaimedBy,
                Expr::value(consumer.to_string()),
            )
            .col_expr(broker_messages::Column::ClaimToken, Expr::value(token.clone()))
            .col_expr(
                broker_messages::Column::ClaimedUntil,
                Expr::value(now + to_chrono(lease)),
            )
            .col_expr(
                broker_messages::Column::Attempts,
                Expr::col(broker_messages::Column::Attempts).add(1),
            )
            .col_expr(broker_messages::Column::UpdatedAt, Expr::value(now))
            .filter(broker_messages::Column::Id.is_in(candidates))
            // re-checked so a competing claim between select and update wins cleanly
            .filter(claimable(now))
            .exec(&self.db)
            .await?;

        let claimed = broker_messages::Entity::find()
            .filter(broker_messages::Column::ClaimToken.eq(token.as_str()))
            .order_by_asc(broker_messages::Column::Id)
            .all(&self.db)
            .await?;

        debug!(subject, consumer, claimed = claimed.len(), "pulled messages");
        Ok(claimed
            .into_iter()
            .map(|message| Delivery {
                id: message.id,
                subject: message.subject,
                payload: message.payload,
                attempt: message.attempts,
                claim_token: token.clone(),
            })
            .collect())
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        self.settle(delivery, STATUS_ACKED, None).await
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        if delivery.attempt >= self.max_deliveries {
            warn!(
                message_id = delivery.id,
                subject = %delivery.subject,
                attempts = delivery.attempt,
                reason,
                "message exhausted its deliveries, dead-lettering"
            );
            self.settle(delivery, STATUS_DEAD, Some(reason)).await
        } else {
            debug!(
                message_id = delivery.id,
                attempts = delivery.attempt,
                reason,
                "message returned for redelivery"
            );
            self.settle(delivery, STATUS_PENDING, Some(reason)).await
        }
    }

    async fn term(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        warn!(message_id = delivery.id, reason, "message terminated");
        self.settle(delivery, STATUS_DEAD, Some(reason)).await
    }
}

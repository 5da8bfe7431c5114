//! Orders and entitlements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

/// A purchase attempt for one course.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// Checkout session reference reported back by the payment provider
    pub provider_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Access grant for one user on one course.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub course_id: Uuid,
    /// None for free enrollments and manual grants
    pub order_id: Option<Uuid>,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Entitlement {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Response to `POST /courses/{id}/checkout`.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    /// Where to send the buyer. None when the course was free and access
    /// was granted immediately.
    pub checkout_url: Option<String>,
    pub entitlement: Option<Entitlement>,
}

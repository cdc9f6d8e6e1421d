pub mod stripe;

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Stripe's floor for a card charge, in cents.
pub const MIN_CHARGE_CENTS: i64 = 50;

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Succeeded,
    /// Still awaiting customer action or processing.
    Pending,
    /// Declined or canceled, with the processor's message.
    Failed(String),
}

/// What the processor reports about an existing intent.
#[derive(Debug, Clone)]
pub struct IntentSummary {
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub metadata: BTreeMap<String, String>,
}

impl IntentSummary {
    pub fn booking_id(&self) -> Option<&str> {
        self.metadata.get("bookingId").map(String::as_str)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: i64,
        metadata: &BTreeMap<String, String>,
    ) -> anyhow::Result<PaymentIntent>;

    async fn retrieve_intent(&self, intent_id: &str) -> anyhow::Result<IntentSummary>;
}

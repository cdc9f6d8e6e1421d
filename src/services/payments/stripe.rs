use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;

use super::{IntentSummary, PaymentGateway, PaymentIntent, PaymentStatus};

const API_BASE: &str = "https://api.stripe.com/v1";
const METADATA_VALUE_LIMIT: usize = 500;

pub struct StripeGateway {
    secret_key: String,
    currency: String,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(secret_key: String, currency: String) -> Self {
        Self {
            secret_key,
            currency,
            client: reqwest::Client::new(),
        }
    }

    fn intent_url(intent_id: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(API_BASE).context("invalid Stripe API base")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Stripe API base cannot hold a path"))?
            .extend(["payment_intents", intent_id]);
        Ok(url)
    }

    async fn call(&self, req: reqwest::RequestBuilder) -> anyhow::Result<serde_json::Value> {
        let resp = req
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .context("failed to call Stripe API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Stripe response")?;

        if !status.is_success() {
            let message = data["error"]["message"].as_str().unwrap_or("unknown error");
            anyhow::bail!("Stripe API error ({status}): {message}");
        }
        Ok(data)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_cents: i64,
        metadata: &BTreeMap<String, String>,
    ) -> anyhow::Result<PaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), self.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in metadata {
            let value: String = value.chars().take(METADATA_VALUE_LIMIT).collect();
            form.push((format!("metadata[{key}]"), value));
        }

        let data = self
            .call(
                self.client
                    .post(format!("{API_BASE}/payment_intents"))
                    .form(&form),
            )
            .await?;

        let id = data["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing id in Stripe response"))?;
        let client_secret = data["client_secret"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing client_secret in Stripe response"))?;

        Ok(PaymentIntent {
            id: id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> anyhow::Result<IntentSummary> {
        let data = self
            .call(self.client.get(Self::intent_url(intent_id)?))
            .await?;
        summary_from_intent(&data)
    }
}

fn summary_from_intent(data: &serde_json::Value) -> anyhow::Result<IntentSummary> {
    let amount_cents = data["amount"]
        .as_i64()
        .ok_or_else(|| anyhow::anyhow!("missing amount in Stripe response"))?;
    let metadata = data["metadata"]
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(IntentSummary {
        status: status_from_intent(data),
        amount_cents,
        metadata,
    })
}

fn status_from_intent(data: &serde_json::Value) -> PaymentStatus {
    let decline = data["last_payment_error"]["message"].as_str();
    match (data["status"].as_str(), decline) {
        (Some("succeeded"), _) => PaymentStatus::Succeeded,
        (Some("canceled"), _) => PaymentStatus::Failed("Payment was canceled".to_string()),
        (Some("requires_payment_method"), Some(message)) => {
            PaymentStatus::Failed(message.to_string())
        }
        _ => PaymentStatus::Pending,
    }
}

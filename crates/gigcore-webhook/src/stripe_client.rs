use async_trait::async_trait;
use gigcore_core::error::CoreError;
use gigcore_core::money::Cents;
use gigcore_core::ports::PaymentProcessorApi;

/// Thin wrapper over the Stripe REST API used by effect workers. Keeps the
/// HTTP surface minimal rather than pulling in the official (much larger)
/// Stripe SDK — only the handful of calls the escrow worker actually needs.
pub struct StripeClient {
    base_url: String,
    secret_key: String,
    http: reqwest::Client,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            base_url: "https://api.stripe.com/v1".to_string(),
            secret_key,
            http: reqwest::Client::new(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        idempotency_key: &str,
        form: &[(&str, String)],
    ) -> Result<serde_json::Value, CoreError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .basic_auth(&self.secret_key, Some(""))
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| CoreError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::ExternalUnavailable(format!(
                "stripe returned {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(|e| CoreError::ExternalUnavailable(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<serde_json::Value, CoreError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| CoreError::ExternalUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::ExternalUnavailable(format!(
                "stripe returned {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(|e| CoreError::ExternalUnavailable(e.to_string()))
    }
}

#[async_trait]
impl PaymentProcessorApi for StripeClient {
    async fn create_payment_intent(
        &self,
        idempotency_key: &str,
        amount: Cents,
        metadata: serde_json::Value,
    ) -> Result<String, CoreError> {
        let json = self
            .post_form(
                "payment_intents",
                idempotency_key,
                &[
                    ("amount", amount.0.to_string()),
                    ("currency", "usd".to_string()),
                    ("metadata", metadata.to_string()),
                ],
            )
            .await?;
        json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::ExternalUnavailable("missing payment_intent id".to_string()))
    }

    async fn capture_payment_intent(
        &self,
        idempotency_key: &str,
        payment_intent_id: &str,
    ) -> Result<(), CoreError> {
        self.post_form(
            &format!("payment_intents/{payment_intent_id}/capture"),
            idempotency_key,
            &[],
        )
        .await?;
        Ok(())
    }

    async fn cancel_payment_intent(
        &self,
        idempotency_key: &str,
        payment_intent_id: &str,
    ) -> Result<(), CoreError> {
        self.post_form(
            &format!("payment_intents/{payment_intent_id}/cancel"),
            idempotency_key,
            &[],
        )
        .await?;
        Ok(())
    }

    async fn create_transfer(
        &self,
        idempotency_key: &str,
        destination_account: &str,
        amount: Cents,
    ) -> Result<String, CoreError> {
        let json = self
            .post_form(
                "transfers",
                idempotency_key,
                &[
                    ("amount", amount.0.to_string()),
                    ("currency", "usd".to_string()),
                    ("destination", destination_account.to_string()),
                ],
            )
            .await?;
        json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::ExternalUnavailable("missing transfer id".to_string()))
    }

    async fn issue_refund(
        &self,
        idempotency_key: &str,
        payment_intent_id: &str,
        amount: Cents,
    ) -> Result<String, CoreError> {
        let json = self
            .post_form(
                "refunds",
                idempotency_key,
                &[
                    ("payment_intent", payment_intent_id.to_string()),
                    ("amount", amount.0.to_string()),
                ],
            )
            .await?;
        json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::ExternalUnavailable("missing refund id".to_string()))
    }

    async fn get_charge_fee(&self, charge_id: &str) -> Result<Option<Cents>, CoreError> {
        let charge = self.get(&format!("charges/{charge_id}")).await?;
        let Some(balance_transaction_id) = charge["balance_transaction"].as_str() else {
            return Ok(None);
        };
        let balance_transaction = self
            .get(&format!("balance_transactions/{balance_transaction_id}"))
            .await?;
        if balance_transaction["status"].as_str() != Some("available")
            && balance_transaction["status"].as_str() != Some("pending")
        {
            return Ok(None);
        }
        match balance_transaction["fee"].as_i64() {
            Some(fee) => Ok(Some(Cents(fee))),
            None => Ok(None),
        }
    }
}

//! HTTP client for the Stripe list endpoints
//!
//! Lists customers and subscriptions created inside a window, following
//! cursor pagination until exhaustion. Only GET endpoints are used.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::BillingConfig;
use crate::error::{Error, Result};
use crate::window::TimeWindow;

use super::{Customer, Subscription};

/// Stripe list-endpoint envelope.
#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

/// Read-only HTTP client for the Stripe API
pub struct StripeClient {
    http_client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl StripeClient {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &BillingConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("billing.api_key is required".to_string()))?;

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    /// List customers created inside the window.
    pub async fn list_customers(&self, window: &TimeWindow) -> Result<Vec<Customer>> {
        self.list_all("/v1/customers", window, &[]).await
    }

    /// List subscriptions created inside the window, in every status.
    pub async fn list_subscriptions(&self, window: &TimeWindow) -> Result<Vec<Subscription>> {
        self.list_all("/v1/subscriptions", window, &[("status", "all")])
            .await
    }

    /// Drain a cursor-paginated list endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        window: &TimeWindow,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>>
    where
        T: HasId,
    {
        let url = format!("{}{}", self.base_url, path);
        let limit = self.page_size.to_string();
        let created_gte = window.start.timestamp().to_string();
        let created_lt = window.end.timestamp().to_string();

        let mut results: Vec<T> = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![
                ("limit", limit.as_str()),
                ("created[gte]", created_gte.as_str()),
                ("created[lt]", created_lt.as_str()),
            ];
            query.extend_from_slice(extra);
            if let Some(cursor) = &starting_after {
                query.push(("starting_after", cursor.as_str()));
            }

            let response = self
                .http_client
                .get(&url)
                .query(&query)
                .send()
                .await
                .map_err(|e| Error::Billing(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(Error::Billing(format!(
                    "API error ({}): {}",
                    status, error_text
                )));
            }

            let page: ListEnvelope<T> = response
                .json()
                .await
                .map_err(|e| Error::Billing(format!("failed to parse response: {}", e)))?;

            let last_id = page.data.last().map(|item| item.id().to_string());
            results.extend(page.data);

            match (page.has_more, last_id) {
                (true, Some(id)) => starting_after = Some(id),
                _ => break,
            }
        }

        tracing::debug!(
            endpoint = path,
            count = results.len(),
            "Fetched billing records"
        );

        Ok(results)
    }
}

/// Cursor extraction for paginated records.
trait HasId {
    fn id(&self) -> &str;
}

impl HasId for Customer {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for Subscription {
    fn id(&self) -> &str {
        &self.id
    }
}

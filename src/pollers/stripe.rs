use crate::error::{ReconcileError, Result};
use crate::ingestion::{BillingInterval, PaymentSubscription, PriceItem};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";
pub const STRIPE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Canceled,
}

impl SubscriptionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionPage {
    pub data: Vec<StripeSubscription>,
    #[serde(default)]
    pub has_more: bool,
}

impl SubscriptionPage {
    /// Cursor for the following page, if there is one.
    pub(crate) fn next_cursor(&self) -> Option<String> {
        if !self.has_more || self.data.len() < STRIPE_PAGE_SIZE {
            return None;
        }
        self.data.last().map(|s| s.id.clone())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeSubscription {
    pub id: String,
    pub created: i64,
    pub canceled_at: Option<i64>,
    pub cancel_at: Option<i64>,
    /// Either an expanded customer object or a bare customer id.
    pub customer: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub items: Option<ItemList>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemList {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItem {
    pub price: Option<Price>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Price {
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
    pub nickname: Option<String>,
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Recurring {
    pub interval: Option<BillingInterval>,
    pub interval_count: Option<u32>,
}

fn timestamp(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

impl StripeSubscription {
    pub(crate) fn into_record(self) -> Option<PaymentSubscription> {
        let Some(created) = timestamp(Some(self.created)) else {
            warn!("Skipping subscription {} with invalid creation time", self.id);
            return None;
        };

        let customer_email = self
            .customer
            .as_ref()
            .and_then(|c| c.get("email"))
            .and_then(|e| e.as_str())
            .map(str::to_string);

        let items = self
            .items
            .map(|list| list.data)
            .unwrap_or_default()
            .into_iter()
            .map(|item| {
                let price = item.price;
                let recurring = price.as_ref().and_then(|p| p.recurring.as_ref());
                PriceItem {
                    unit_amount: price.as_ref().and_then(|p| p.unit_amount),
                    currency: price.as_ref().and_then(|p| p.currency.clone()),
                    nickname: price.as_ref().and_then(|p| p.nickname.clone()),
                    interval: recurring.and_then(|r| r.interval),
                    interval_count: recurring.and_then(|r| r.interval_count),
                }
            })
            .collect();

        Some(PaymentSubscription {
            id: self.id,
            created,
            canceled_at: timestamp(self.canceled_at),
            cancel_at: timestamp(self.cancel_at),
            customer_email,
            metadata: self.metadata,
            items,
        })
    }
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Query parameters for one subscriptions page. `created_gte` is filtered by the provider.
fn list_query(
    status: SubscriptionStatus,
    created_gte: Option<DateTime<Utc>>,
    starting_after: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("limit", STRIPE_PAGE_SIZE.to_string()),
        ("status", status.as_str().to_string()),
        ("expand[]", "data.items.data.price".to_string()),
        ("expand[]", "data.customer".to_string()),
    ];
    if let Some(created) = created_gte {
        query.push(("created[gte]", created.timestamp().to_string()));
    }
    if let Some(cursor) = starting_after {
        query.push(("starting_after", cursor.to_string()));
    }
    query
}

impl StripeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: STRIPE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Lists every subscription with `status`, following `starting_after` pagination.
    pub async fn list_subscriptions(
        &self,
        status: SubscriptionStatus,
        created_gte: Option<DateTime<Utc>>,
    ) -> Result<Vec<PaymentSubscription>> {
        let url = format!("{}/subscriptions", self.base_url);
        let mut records = Vec::new();
        let mut starting_after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let query = list_query(status, created_gte, starting_after.as_deref());

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .query(&query)
                .send()
                .await?;

            let http_status = response.status();
            if !http_status.is_success() {
                let body = response.text().await?;
                return Err(ReconcileError::UpstreamStatus {
                    status: http_status.as_u16(),
                    body,
                });
            }

            let page: SubscriptionPage = response.json().await?;
            pages += 1;
            starting_after = page.next_cursor();
            records.extend(page.data.into_iter().filter_map(StripeSubscription::into_record));

            if starting_after.is_none() {
                break;
            }
        }

        debug!(
            "Fetched {} {} subscriptions in {} pages",
            records.len(),
            status.as_str(),
            pages
        );
        Ok(records)
    }
}

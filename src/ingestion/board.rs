use super::{DayBuckets, DEFAULT_CURRENCY};
use crate::schema::{CancellationPoint, LineItem, NewSubscriptionPoint};
use crate::utils::{day_start, parse_month_name};
use chrono::{Datelike, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_BOARD_PLAN: &str = "Enterprise";

/// An enterprise account tracked on the CRM board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardAccount {
    pub customer_name: Option<String>,
    pub annual_amount_cents: Option<i64>,
    /// Calendar years in which the account was active.
    pub years: Vec<i32>,
    pub renewal_month: Option<String>,
    pub plan: String,
    pub interventions_eligible: Option<bool>,
}

impl BoardAccount {
    fn line_item(&self, monthly_cents: i64) -> LineItem {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "monday".to_string());
        metadata.insert(
            "interventionsEligible".to_string(),
            self.interventions_eligible
                .map(|e| e.to_string())
                .unwrap_or_default(),
        );

        LineItem {
            identity: self.customer_name.clone(),
            label: Some(self.plan.clone()),
            amount_cents: Some(monthly_cents),
            currency: Some(DEFAULT_CURRENCY.to_string()),
            metadata,
            ..Default::default()
        }
    }
}

/// Derives subscription and cancellation points from yearly board flags.
///
/// Each active year yields a subscription on the first day of the renewal month. A year
/// followed by an inactive year yields a cancellation one year later, but only once that
/// renewal date has passed relative to `today`.
pub fn board_points(
    accounts: &[BoardAccount],
    today: NaiveDate,
) -> (Vec<NewSubscriptionPoint>, Vec<CancellationPoint>) {
    let mut subscriptions = DayBuckets::default();
    let mut cancellations = DayBuckets::default();
    let mut skipped = 0usize;

    for account in accounts {
        let (Some(annual), Some(month)) = (
            account.annual_amount_cents.filter(|a| *a != 0),
            account.renewal_month.as_deref().and_then(parse_month_name),
        ) else {
            skipped += 1;
            continue;
        };
        if account.years.is_empty() {
            skipped += 1;
            continue;
        }

        let monthly_cents = (annual as f64 / 12.0).round() as i64;
        let mut years = account.years.clone();
        years.sort_unstable();
        years.dedup();

        for &year in &years {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
                subscriptions.push(date, account.line_item(monthly_cents));
            }

            let next_year = year + 1;
            if years.binary_search(&next_year).is_ok() {
                continue;
            }
            let renewal_passed = next_year < today.year()
                || (next_year == today.year() && month < today.month());
            if !renewal_passed {
                continue;
            }
            if let Some(date) = NaiveDate::from_ymd_opt(next_year, month, 1) {
                let mut item = account.line_item(monthly_cents);
                item.canceled_at = Some(day_start(date));
                cancellations.push(date, item);
            }
        }
    }

    debug!(
        "Derived board points from {} accounts ({} skipped)",
        accounts.len(),
        skipped
    );

    (
        subscriptions.into_new_subscription_points(),
        cancellations.into_cancellation_points(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardColumn {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardColumnValue {
    pub id: String,
    pub text: Option<String>,
    /// JSON-encoded value for complex column types.
    pub value: Option<String>,
    /// Items a relation column points at.
    #[serde(default)]
    pub linked_item_ids: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RelationValue {
    #[serde(default)]
    linked_item_ids: Vec<serde_json::Value>,
}

impl BoardColumnValue {
    /// Linked item ids from the relation fragment, else from the JSON value.
    pub fn linked_ids(&self) -> Vec<String> {
        if let Some(ids) = &self.linked_item_ids {
            return ids.clone();
        }
        self.value
            .as_deref()
            .and_then(|v| serde_json::from_str::<RelationValue>(v).ok())
            .map(|relation| {
                relation
                    .linked_item_ids
                    .into_iter()
                    .filter_map(|id| match id {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: String,
    pub name: String,
    pub group_title: Option<String>,
    pub column_values: Vec<BoardColumnValue>,
}

impl BoardItem {
    fn column(&self, id: Option<&str>) -> Option<&BoardColumnValue> {
        let id = id?;
        self.column_values.iter().find(|c| c.id == id)
    }

    /// Column text, falling back to its raw value.
    fn column_text(&self, id: Option<&str>) -> Option<&str> {
        let column = self.column(id)?;
        column
            .text
            .as_deref()
            .or(column.value.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// Customer text of the relation column, if the board rendered one.
    fn customer_text(&self, columns: &BoardColumnMap) -> Option<&str> {
        self.column(columns.customer.as_deref())?
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// First linked item of the relation column, used when the text is blank.
    fn linked_customer_id(&self, columns: &BoardColumnMap) -> Option<String> {
        if self.customer_text(columns).is_some() {
            return None;
        }
        self.column(columns.customer.as_deref())?
            .linked_ids()
            .into_iter()
            .next()
    }
}

/// Linked item ids whose names are needed to label customers with blank relation text.
pub fn unresolved_customer_ids(items: &[BoardItem], columns: &BoardColumnMap) -> Vec<String> {
    let ids: BTreeSet<String> = items
        .iter()
        .filter_map(|item| item.linked_customer_id(columns))
        .collect();
    ids.into_iter().collect()
}

/// Resolves the board's column ids from their titles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardColumnMap {
    pub customer: Option<String>,
    pub amount: Option<String>,
    pub renewal_month: Option<String>,
    pub plan: Option<String>,
    pub eligibility: Option<String>,
    /// Checkbox columns titled with a four-digit year.
    pub years: Vec<(i32, String)>,
}

impl BoardColumnMap {
    pub fn from_columns(columns: &[BoardColumn]) -> Self {
        let find = |needles: &[&str]| {
            columns
                .iter()
                .find(|c| {
                    let title = c.title.to_lowercase();
                    needles.iter().any(|n| title.contains(n))
                })
                .map(|c| c.id.clone())
        };

        let years = columns
            .iter()
            .filter_map(|c| {
                let title = c.title.trim();
                (title.len() == 4)
                    .then(|| title.parse::<i32>().ok())
                    .flatten()
                    .map(|year| (year, c.id.clone()))
            })
            .collect();

        Self {
            customer: find(&["anagrafica clienti", "customer"]),
            amount: find(&["importo", "amount"]),
            renewal_month: find(&["mese scadenza", "renewal"]),
            plan: find(&["tipologia", "plan"]),
            eligibility: find(&["ammissibili", "eligible"]),
            years,
        }
    }
}

/// Parses a free-text money amount (e.g. `"€ 1200.50"`) into cents.
pub fn parse_amount_cents(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    Some((value * 100.0).round() as i64)
}

/// Reads a checkbox column value such as `{"checked": true}` or `{"checked": "true"}`.
pub fn is_checked(value: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json) => match json.get("checked") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        },
        Err(_) => false,
    }
}

/// Reads one board item. `linked_names` maps linked item ids to their names and labels
/// customers whose relation column carries no text.
pub fn account_from_item(
    item: &BoardItem,
    columns: &BoardColumnMap,
    linked_names: &BTreeMap<String, String>,
) -> BoardAccount {
    let years = columns
        .years
        .iter()
        .filter(|(_, id)| {
            item.column(Some(id.as_str()))
                .and_then(|c| c.value.as_deref())
                .is_some_and(is_checked)
        })
        .map(|(year, _)| *year)
        .collect();

    let interventions_eligible = columns.eligibility.as_deref().map(|id| {
        item.column_text(Some(id)).is_some_and(|t| {
            t.eq_ignore_ascii_case("ammissibili") || t.eq_ignore_ascii_case("eligible")
        })
    });

    BoardAccount {
        customer_name: item.customer_text(columns).map(str::to_string).or_else(|| {
            item.linked_customer_id(columns)
                .and_then(|id| linked_names.get(&id).cloned())
        }),
        annual_amount_cents: item
            .column_text(columns.amount.as_deref())
            .and_then(parse_amount_cents),
        years,
        renewal_month: item
            .column_text(columns.renewal_month.as_deref())
            .map(str::to_string),
        plan: item
            .column_text(columns.plan.as_deref())
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| DEFAULT_BOARD_PLAN.to_string()),
        interventions_eligible,
    }
}

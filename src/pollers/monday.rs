use crate::error::{ReconcileError, Result};
use crate::ingestion::{
    unresolved_customer_ids, BoardColumn, BoardColumnMap, BoardColumnValue, BoardItem,
};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

const MONDAY_API_URL: &str = "https://api.monday.com/v2";
pub const MONDAY_PAGE_SIZE: usize = 500;

const FIRST_PAGE_QUERY: &str = r#"
query ($boardId: [ID!], $limit: Int!) {
  boards(ids: $boardId) {
    id
    name
    columns { id title }
    items_page(limit: $limit) {
      cursor
      items {
        id
        name
        group { id title }
        column_values {
          id
          text
          value
          ... on BoardRelationValue { linked_item_ids }
        }
      }
    }
  }
}"#;

const NEXT_PAGE_QUERY: &str = r#"
query ($cursor: String!, $limit: Int!) {
  next_items_page(cursor: $cursor, limit: $limit) {
    cursor
    items {
      id
      name
      group { id title }
      column_values {
        id
        text
        value
        ... on BoardRelationValue { linked_item_ids }
      }
    }
  }
}"#;

const ITEM_NAMES_QUERY: &str = r#"
query ($itemIds: [ID!], $limit: Int!) {
  items(ids: $itemIds, limit: $limit) {
    id
    name
  }
}"#;

/// Upper bound on ids per `items(ids:)` request.
pub const MONDAY_ITEM_IDS_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BoardsData {
    #[serde(default)]
    boards: Vec<BoardPayload>,
}

#[derive(Debug, Deserialize)]
struct BoardPayload {
    name: Option<String>,
    #[serde(default)]
    columns: Vec<BoardColumn>,
    items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
struct NextPageData {
    next_items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    cursor: Option<String>,
    #[serde(default)]
    items: Vec<ItemPayload>,
}

impl ItemsPage {
    fn next_cursor(&self) -> Option<String> {
        if self.items.len() < MONDAY_PAGE_SIZE {
            return None;
        }
        self.cursor.clone()
    }
}

#[derive(Debug, Deserialize)]
struct ItemNamesData {
    #[serde(default)]
    items: Vec<ItemName>,
}

#[derive(Debug, Deserialize)]
struct ItemName {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GroupPayload {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    id: String,
    name: String,
    group: Option<GroupPayload>,
    #[serde(default)]
    column_values: Vec<BoardColumnValue>,
}

impl From<ItemPayload> for BoardItem {
    fn from(item: ItemPayload) -> Self {
        Self {
            id: item.id,
            name: item.name,
            group_title: item.group.map(|g| g.title),
            column_values: item.column_values,
        }
    }
}

/// Column definitions and every item of one board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub name: Option<String>,
    pub columns: Vec<BoardColumn>,
    pub items: Vec<BoardItem>,
    /// Names of items linked from the customer relation column, by item id.
    pub linked_names: BTreeMap<String, String>,
}

/// Unwraps a GraphQL envelope, surfacing a provider `errors` payload as an error.
fn unwrap_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let response: GraphQlResponse<T> = serde_json::from_str(body)?;
    if let Some(errors) = response.errors {
        return Err(ReconcileError::ProviderError(errors.to_string()));
    }
    response
        .data
        .ok_or_else(|| ReconcileError::ProviderError("Response carried no data".to_string()))
}

#[derive(Clone)]
pub struct MondayClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl MondayClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.trim().to_string(),
            api_url: MONDAY_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ReconcileError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        unwrap_response(&body)
    }

    /// Reads the board's columns and follows the item cursor until it runs out.
    pub async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot> {
        let first: BoardsData = self
            .execute(
                FIRST_PAGE_QUERY,
                json!({ "boardId": [board_id], "limit": MONDAY_PAGE_SIZE }),
            )
            .await?;

        let board = first.boards.into_iter().next().ok_or_else(|| {
            ReconcileError::ProviderError(format!("Board {} not found", board_id))
        })?;

        let mut cursor = board.items_page.next_cursor();
        let mut items: Vec<BoardItem> = board
            .items_page
            .items
            .into_iter()
            .map(BoardItem::from)
            .collect();
        let mut pages = 1usize;

        while let Some(current) = cursor {
            let next: NextPageData = self
                .execute(
                    NEXT_PAGE_QUERY,
                    json!({ "cursor": current, "limit": MONDAY_PAGE_SIZE }),
                )
                .await?;
            pages += 1;
            cursor = next.next_items_page.next_cursor();
            items.extend(next.next_items_page.items.into_iter().map(BoardItem::from));
        }

        debug!(
            "Fetched {} items from board {} in {} pages",
            items.len(),
            board_id,
            pages
        );

        let columns = BoardColumnMap::from_columns(&board.columns);
        let linked_ids = unresolved_customer_ids(&items, &columns);
        let linked_names = match self.resolve_item_names(&linked_ids).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not resolve {} linked customers: {}", linked_ids.len(), e);
                BTreeMap::new()
            }
        };

        Ok(BoardSnapshot {
            name: board.name,
            columns: board.columns,
            items,
            linked_names,
        })
    }

    /// Looks up item names by id, batching the ids per request.
    pub async fn resolve_item_names(&self, ids: &[String]) -> Result<BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        for chunk in ids.chunks(MONDAY_ITEM_IDS_PER_REQUEST) {
            let data: ItemNamesData = self
                .execute(
                    ITEM_NAMES_QUERY,
                    json!({ "itemIds": chunk, "limit": chunk.len() }),
                )
                .await?;
            names.extend(data.items.into_iter().map(|item| (item.id, item.name)));
        }
        debug!("Resolved {} of {} linked item names", names.len(), ids.len());
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_board_response() {
        let body = r#"{
            "data": {
                "boards": [{
                    "id": "1",
                    "name": "Enterprise Accounts",
                    "columns": [{ "id": "c24", "title": "2024", "type": "checkbox" }],
                    "items_page": {
                        "cursor": null,
                        "items": [{
                            "id": "10",
                            "name": "Contract",
                            "group": { "id": "g1", "title": "AVACY" },
                            "column_values": [
                                { "id": "c24", "text": "v", "value": "{\"checked\":true}" },
                                { "id": "rel", "text": "", "value": null, "linked_item_ids": ["901"] }
                            ]
                        }]
                    }
                }]
            }
        }"#;

        let data: BoardsData = unwrap_response(body).unwrap();
        let board = data.boards.into_iter().next().unwrap();
        assert_eq!(board.columns[0].title, "2024");
        assert_eq!(board.items_page.next_cursor(), None);

        let item = BoardItem::from(board.items_page.items.into_iter().next().unwrap());
        assert_eq!(item.group_title.as_deref(), Some("AVACY"));
        assert_eq!(item.column_values[0].value.as_deref(), Some(r#"{"checked":true}"#));
        assert_eq!(item.column_values[0].linked_item_ids, None);
        assert_eq!(item.column_values[1].linked_ids(), vec!["901".to_string()]);
    }

    #[test]
    fn test_unwrap_item_names_response() {
        let body = r#"{
            "data": {
                "items": [
                    { "id": "901", "name": "Acme S.p.A." },
                    { "id": "903", "name": "Globex" }
                ]
            }
        }"#;

        let data: ItemNamesData = unwrap_response(body).unwrap();
        let names: BTreeMap<String, String> =
            data.items.into_iter().map(|item| (item.id, item.name)).collect();
        assert_eq!(names.get("901").map(String::as_str), Some("Acme S.p.A."));
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn test_no_linked_ids_skips_lookup() {
        // an unroutable url would fail if a request were sent
        let client = MondayClient::new("key".to_string()).with_api_url("http://127.0.0.1:9");
        let names = client.resolve_item_names(&[]).await.unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_errors_payload_is_provider_error() {
        let body = r#"{ "errors": [{ "message": "Not Authenticated" }], "data": null }"#;
        let result: Result<BoardsData> = unwrap_response(body);
        match result {
            Err(ReconcileError::ProviderError(details)) => {
                assert!(details.contains("Not Authenticated"))
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_short_page_stops_pagination() {
        let page = ItemsPage {
            cursor: Some("abc".to_string()),
            items: Vec::new(),
        };
        assert_eq!(page.next_cursor(), None);

        let full = ItemsPage {
            cursor: Some("abc".to_string()),
            items: (0..MONDAY_PAGE_SIZE)
                .map(|i| ItemPayload {
                    id: i.to_string(),
                    name: "Item".to_string(),
                    group: None,
                    column_values: Vec::new(),
                })
                .collect(),
        };
        assert_eq!(full.next_cursor().as_deref(), Some("abc"));
    }
}

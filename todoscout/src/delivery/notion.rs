//! Notion database delivery.
//!
//! Every TODO becomes one page in the target database. Databases differ in
//! which properties they define, so the schema is fetched once and each
//! field is written only when a fitting property exists:
//!
//! | Field     | Property type  | Accepted names (case-insensitive)     |
//! |-----------|----------------|---------------------------------------|
//! | content   | `title`        | any                                   |
//! | status    | `status`, else a `select` named like "status", else the first `select` | any |
//! | file path | `rich_text`    | File, Path, File Path, 파일 경로      |
//! | line      | `number`       | Line, Line Number, 라인 번호          |
//! | priority  | `select`       | Priority, 우선순위                    |
//! | assignee  | `rich_text`    | Assignee, Owner, 담당자               |
//! | tags      | `multi_select` | Tags, Labels, 태그                    |
//!
//! A database without a title property cannot receive pages; that is a
//! permanent failure.
use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{classify_status, Deliverer, DeliveryError};
use crate::results::{Priority, TodoItem};

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

const FILE_PATH_NAMES: &[&str] = &["파일 경로", "File", "Path", "File Path"];
const LINE_NUMBER_NAMES: &[&str] = &["라인 번호", "Line", "Line Number"];
const PRIORITY_NAMES: &[&str] = &["우선순위", "Priority"];
const ASSIGNEE_NAMES: &[&str] = &["담당자", "Assignee", "Owner"];
const TAG_NAMES: &[&str] = &["태그", "Tags", "Labels"];

/// Status options that mean "not started yet", tried before the first option
const OPEN_STATUS_NAMES: &[&str] = &[
    "To Do",
    "TODO",
    "Not started",
    "할 일",
    "대기",
    "Backlog",
    "Open",
];

#[derive(Debug, Clone, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionList {
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

/// One property definition from a database schema
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDef {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<OptionList>,
    #[serde(default)]
    pub select: Option<OptionList>,
}

impl PropertyDef {
    fn options(&self) -> &[SelectOption] {
        let list = match self.kind.as_str() {
            "status" => self.status.as_ref(),
            "select" => self.select.as_ref(),
            _ => None,
        };
        list.map(|l| l.options.as_slice()).unwrap_or(&[])
    }

    /// A "not started" option if the property has one, else its first option
    pub fn open_option(&self) -> Option<&str> {
        let options = self.options();
        options
            .iter()
            .find(|o| {
                OPEN_STATUS_NAMES
                    .iter()
                    .any(|p| o.name.eq_ignore_ascii_case(p))
            })
            .or_else(|| options.first())
            .map(|o| o.name.as_str())
    }

    /// The existing option for `priority`, or its English name
    pub fn priority_option(&self, priority: Priority) -> String {
        let candidates: &[&str] = match priority {
            Priority::High => &["High", "높음"],
            Priority::Medium => &["Medium", "보통"],
            Priority::Low => &["Low", "낮음"],
        };
        self.options()
            .iter()
            .find(|o| candidates.iter().any(|c| o.name.eq_ignore_ascii_case(c)))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| candidates[0].to_string())
    }
}

/// Property definitions keyed by property name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDef>,
}

impl DatabaseSchema {
    /// First property of type `kind`, in name order
    pub fn find_by_type(&self, kind: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, def)| def.kind == kind)
            .map(|(name, _)| name.as_str())
    }

    /// A property of type `kind` whose name is one of `names`
    pub fn find_by_type_and_name(&self, kind: &str, names: &[&str]) -> Option<&str> {
        self.properties
            .iter()
            .find(|(name, def)| {
                def.kind == kind
                    && names
                        .iter()
                        .any(|n| n.to_lowercase() == name.to_lowercase())
            })
            .map(|(name, _)| name.as_str())
    }

    /// The `select` property most likely to hold a status
    pub fn status_like_select(&self) -> Option<&str> {
        let selects: Vec<&str> = self
            .properties
            .iter()
            .filter(|(_, def)| def.kind == "select")
            .map(|(name, _)| name.as_str())
            .collect();
        selects
            .iter()
            .find(|name| {
                let lower = name.to_lowercase();
                lower.contains("status") || lower.contains("상태")
            })
            .or_else(|| selects.first())
            .copied()
    }

    /// Page properties for `item` under this schema
    pub fn page_properties(&self, item: &TodoItem) -> Result<Value, DeliveryError> {
        let title = self.find_by_type("title").ok_or_else(|| {
            DeliveryError::permanent("Notion database has no title property")
        })?;

        let mut props = Map::new();
        props.insert(
            title.to_string(),
            json!({ "title": [{ "text": { "content": item.content } }] }),
        );

        if let Some(name) = self.find_by_type_and_name("rich_text", FILE_PATH_NAMES) {
            props.insert(name.to_string(), rich_text(&item.file_path));
        }
        if let Some(name) = self.find_by_type_and_name("number", LINE_NUMBER_NAMES) {
            props.insert(name.to_string(), json!({ "number": item.line_number }));
        }

        if let Some(name) = self.find_by_type("status") {
            if let Some(option) = self.properties[name].open_option() {
                props.insert(name.to_string(), json!({ "status": { "name": option } }));
            }
        } else if let Some(name) = self.status_like_select() {
            if let Some(option) = self.properties[name].open_option() {
                props.insert(name.to_string(), json!({ "select": { "name": option } }));
            }
        }

        if let (Some(name), Some(priority)) = (
            self.find_by_type_and_name("select", PRIORITY_NAMES),
            item.priority,
        ) {
            let option = self.properties[name].priority_option(priority);
            props.insert(name.to_string(), json!({ "select": { "name": option } }));
        }
        if let (Some(name), Some(assignee)) = (
            self.find_by_type_and_name("rich_text", ASSIGNEE_NAMES),
            item.assignee.as_deref(),
        ) {
            props.insert(name.to_string(), rich_text(assignee));
        }
        if let (Some(name), Some(tags)) = (
            self.find_by_type_and_name("multi_select", TAG_NAMES),
            item.tags.as_ref(),
        ) {
            let options: Vec<Value> = tags.iter().map(|t| json!({ "name": t })).collect();
            props.insert(name.to_string(), json!({ "multi_select": options }));
        }

        Ok(Value::Object(props))
    }
}

fn rich_text(text: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": text } }] })
}

/// A Notion database receiving one page per TODO
#[derive(Debug)]
pub struct NotionDatabase {
    client: Client,
    api_base: String,
    api_key: String,
    database_id: String,
    schema: OnceCell<DatabaseSchema>,
}

impl NotionDatabase {
    pub fn new(
        api_key: impl Into<String>,
        database_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let api_key = api_key.into();
        let database_id = database_id.into();
        if api_key.trim().is_empty() || database_id.trim().is_empty() {
            return Err(DeliveryError::permanent(
                "Notion API key and database ID are both required",
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::permanent(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: NOTION_API_BASE.to_string(),
            api_key,
            database_id,
            schema: OnceCell::new(),
        })
    }

    /// Points requests at another API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
    }

    fn fetch_schema(&self) -> Result<DatabaseSchema, DeliveryError> {
        let url = format!("{}/databases/{}", self.api_base, self.database_id);
        let response = self.authorized(self.client.get(&url)).send()?;
        if let Some(err) = classify_status("Notion", response.status()) {
            return Err(err);
        }
        let schema: DatabaseSchema = response.json().map_err(|e| {
            DeliveryError::permanent(format!("unexpected Notion database response: {}", e))
        })?;
        debug!(
            "Fetched Notion schema with {} properties",
            schema.properties.len()
        );
        Ok(schema)
    }

    /// The database schema, fetched on first use and then reused
    pub fn schema(&self) -> Result<&DatabaseSchema, DeliveryError> {
        self.schema.get_or_try_init(|| self.fetch_schema())
    }

    /// Retrieves the database. Any failure counts as `false`.
    pub fn test_connection(&self) -> bool {
        match self.fetch_schema() {
            Ok(_) => true,
            Err(e) => {
                warn!("Notion connection test failed: {}", e);
                false
            }
        }
    }
}

impl Deliverer for NotionDatabase {
    fn name(&self) -> &str {
        "Notion"
    }

    fn deliver(&self, item: &TodoItem) -> Result<(), DeliveryError> {
        let properties = self.schema()?.page_properties(item)?;
        let payload = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
        });

        let url = format!("{}/pages", self.api_base);
        let response = self
            .authorized(self.client.post(&url))
            .json(&payload)
            .send()?;
        match classify_status("Notion", response.status()) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

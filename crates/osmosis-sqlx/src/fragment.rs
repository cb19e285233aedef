//! Structured view of a config block
//!
//! Only `type`, `schema` and `columns` are interpreted. Every other key is kept
//! as an opaque JSON value in its original position.

use crate::error::FragmentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Key holding the column metadata
pub const COLUMNS_KEY: &str = "columns";

/// Key holding a column's description
pub const DESCRIPTION_KEY: &str = "description";

/// Key holding a column's policy tags
pub const POLICY_TAGS_KEY: &str = "bigqueryPolicyTags";

/// Definition kind declared by `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
    Incremental,
    Declaration,
    Assertion,
    Test,
    Operations,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Incremental => "incremental",
            Self::Declaration => "declaration",
            Self::Assertion => "assertion",
            Self::Test => "test",
            Self::Operations => "operations",
        }
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            "incremental" => Ok(Self::Incremental),
            "declaration" => Ok(Self::Declaration),
            "assertion" => Ok(Self::Assertion),
            "test" => Ok(Self::Test),
            "operations" => Ok(Self::Operations),
            other => Err(format!("unknown type `{}`", other)),
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata for one column
#[derive(Debug, Clone)]
pub struct ColumnRecord {
    pub description: String,

    /// Policy tag resource names, in declaration order
    pub policy_tags: Option<Vec<String>>,

    /// Other keys of the column object (`displayName`, nested `columns`, ...)
    pub extra: Map<String, Value>,

    /// Key order of the entry as written
    layout: Vec<String>,
}

impl Default for ColumnRecord {
    fn default() -> Self {
        Self::new("")
    }
}

/// Equality ignores on-disk key order
impl PartialEq for ColumnRecord {
    fn eq(&self, other: &Self) -> bool {
        self.description == other.description && self.policy_tags == other.policy_tags && self.extra == other.extra
    }
}

impl ColumnRecord {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            policy_tags: None,
            extra: Map::new(),
            layout: vec![DESCRIPTION_KEY.to_string()],
        }
    }

    pub fn with_policy_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the column carries any policy tag field
    pub fn has_policy_tags(&self) -> bool {
        self.policy_tags.is_some()
    }

    /// Normalize an on-disk column entry
    ///
    /// A bare string is the compact form of `{ description: <string> }`; a
    /// single policy tag string becomes a one-element list.
    pub fn from_value(name: &str, value: Value) -> Result<Self, FragmentError> {
        match value {
            Value::String(description) => Ok(Self::new(description)),
            Value::Object(mut map) => {
                let layout = map.keys().cloned().collect();

                let description = match map.remove(DESCRIPTION_KEY) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s,
                    Some(_) => {
                        return Err(FragmentError::invalid(format!(
                            "column `{}`: description must be a string",
                            name
                        )))
                    }
                };

                let policy_tags = match map.remove(POLICY_TAGS_KEY) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(tag)) => Some(vec![tag]),
                    Some(Value::Array(items)) => Some(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Value::String(tag) => Ok(tag),
                                _ => Err(FragmentError::invalid(format!(
                                    "column `{}`: {} must contain strings",
                                    name, POLICY_TAGS_KEY
                                ))),
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    Some(_) => {
                        return Err(FragmentError::invalid(format!(
                            "column `{}`: {} must be a string or a list of strings",
                            name, POLICY_TAGS_KEY
                        )))
                    }
                };

                Ok(Self {
                    description,
                    policy_tags,
                    extra: map,
                    layout,
                })
            }
            _ => Err(FragmentError::invalid(format!(
                "column `{}` must be a string or an object",
                name
            ))),
        }
    }

    /// Expanded on-disk form
    ///
    /// Keys keep their on-disk order. A description or policy tag list the
    /// entry did not have before goes first. An empty description is only
    /// written when the entry already had one.
    pub fn to_value(&self) -> Value {
        let had = |key: &str| self.layout.iter().any(|k| k == key);
        let describe = had(DESCRIPTION_KEY) || !self.description.is_empty();

        let mut map = Map::new();
        if describe && !had(DESCRIPTION_KEY) {
            map.insert(DESCRIPTION_KEY.to_string(), self.description_value());
        }
        if let Some(tags) = self.tags_value().filter(|_| !had(POLICY_TAGS_KEY)) {
            map.insert(POLICY_TAGS_KEY.to_string(), tags);
        }

        for key in &self.layout {
            let value = match key.as_str() {
                DESCRIPTION_KEY => Some(self.description_value()),
                POLICY_TAGS_KEY => self.tags_value(),
                other => self.extra.get(other).cloned(),
            };
            if let Some(value) = value {
                map.insert(key.clone(), value);
            }
        }

        for (key, value) in &self.extra {
            if !map.contains_key(key) {
                map.insert(key.clone(), value.clone());
            }
        }
        Value::Object(map)
    }

    fn description_value(&self) -> Value {
        Value::String(self.description.clone())
    }

    fn tags_value(&self) -> Option<Value> {
        self.policy_tags
            .as_ref()
            .map(|tags| Value::Array(tags.iter().cloned().map(Value::String).collect()))
    }
}

/// Column records in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    entries: Vec<(String, ColumnRecord)>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnRecord> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ColumnRecord> {
        self.position(name).map(move |i| &mut self.entries[i].1)
    }

    /// Insert or replace; new names are appended
    pub fn insert(&mut self, name: impl Into<String>, record: ColumnRecord) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = record,
            None => self.entries.push((name, record)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnRecord)> {
        self.entries.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Move the columns named in `order` to the front, in that order
    ///
    /// Columns not in `order` follow, keeping their relative order. Names in
    /// `order` that are not present are ignored.
    pub fn reorder<S: AsRef<str>>(&mut self, order: &[S]) {
        let mut rest = std::mem::take(&mut self.entries);
        let mut sorted = Vec::with_capacity(rest.len());

        for name in order {
            if let Some(i) = rest.iter().position(|(n, _)| n == name.as_ref()) {
                sorted.push(rest.remove(i));
            }
        }
        sorted.extend(rest);
        self.entries = sorted;
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    fn from_value(value: Value) -> Result<Self, FragmentError> {
        let Value::Object(map) = value else {
            return Err(FragmentError::invalid("`columns` must be an object"));
        };

        let mut columns = Self::new();
        for (name, entry) in map {
            let record = ColumnRecord::from_value(&name, entry)?;
            columns.entries.push((name, record));
        }
        Ok(columns)
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, record) in &self.entries {
            map.insert(name.clone(), record.to_value());
        }
        Value::Object(map)
    }
}

/// Parsed config block
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFragment {
    /// Every key except `columns`, in original order
    fields: Map<String, Value>,

    /// Index of `columns` among the original keys, if it was present
    columns_at: Option<usize>,

    columns: Columns,
}

impl ConfigFragment {
    /// Fragment used for files without a config block
    pub fn empty_table() -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(TableKind::Table.as_str().to_string()));
        Self {
            fields,
            columns_at: None,
            columns: Columns::new(),
        }
    }

    /// Build from the parsed block object
    pub fn from_value(value: Value) -> Result<Self, FragmentError> {
        let Value::Object(map) = value else {
            return Err(FragmentError::invalid("config block must be an object"));
        };

        let mut fields = Map::new();
        let mut columns_at = None;
        let mut columns = Columns::new();

        for (index, (key, value)) in map.into_iter().enumerate() {
            if key == COLUMNS_KEY {
                columns_at = Some(index);
                columns = Columns::from_value(value)?;
            } else {
                fields.insert(key, value);
            }
        }

        Ok(Self {
            fields,
            columns_at,
            columns,
        })
    }

    /// Parse a `{ ... }` body in relaxed syntax
    pub fn parse(body: &str) -> Result<Self, FragmentError> {
        Self::from_value(crate::relaxed::parse_str(body)?)
    }

    /// Declared `type`, if recognised
    pub fn kind(&self) -> Option<TableKind> {
        self.fields.get("type")?.as_str()?.parse().ok()
    }

    /// Declared `schema`
    pub fn schema(&self) -> Option<&str> {
        self.fields.get("schema")?.as_str()
    }

    /// Any non-column key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut Columns {
        &mut self.columns
    }

    /// Structured form with `columns` back in its original slot
    ///
    /// When the block had no `columns` key, one is appended only if columns
    /// were added since.
    pub fn to_value(&self) -> Value {
        let insert_at = match self.columns_at {
            Some(index) => Some(index),
            None if !self.columns.is_empty() => Some(self.fields.len()),
            None => None,
        };

        let mut map = Map::new();
        for (index, (key, value)) in self.fields.iter().enumerate() {
            if insert_at == Some(index) {
                map.insert(COLUMNS_KEY.to_string(), self.columns.to_value());
            }
            map.insert(key.clone(), value.clone());
        }
        if insert_at.map_or(false, |index| index >= self.fields.len()) {
            map.insert(COLUMNS_KEY.to_string(), self.columns.to_value());
        }
        Value::Object(map)
    }

    /// `config { ... }` text with a two-space indented JSON body
    pub fn render(&self) -> Result<String, FragmentError> {
        let body = serde_json::to_string_pretty(&self.to_value())
            .map_err(|e| FragmentError::Render(e.to_string()))?;
        Ok(format!("{} {}", crate::block::CONFIG_KEYWORD, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(value: &Value) -> Vec<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn compact_columns_are_expanded() {
        let fragment = ConfigFragment::parse(
            r#"{
                type: "table",
                columns: {
                    id: "id",
                    name: {
                        description: "name description",
                        bigqueryPolicyTags: "projects/example/taxonomies/123456/policyTags/123"
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(fragment.kind(), Some(TableKind::Table));
        assert_eq!(fragment.columns().get("id"), Some(&ColumnRecord::new("id")));
        assert_eq!(
            fragment.columns().get("name"),
            Some(
                &ColumnRecord::new("name description")
                    .with_policy_tags(["projects/example/taxonomies/123456/policyTags/123"])
            )
        );
    }

    #[test]
    fn column_without_description_defaults_to_empty() {
        let fragment = ConfigFragment::parse("{ columns: { id: { bigqueryPolicyTags: ['t'] } } }").unwrap();
        let id = fragment.columns().get("id").unwrap();
        assert_eq!(id.description, "");
        assert_eq!(id.policy_tags, Some(vec!["t".to_string()]));
    }

    #[test]
    fn invalid_columns() {
        assert!(ConfigFragment::parse("{ columns: [] }").is_err());
        assert!(ConfigFragment::parse("{ columns: { id: 1 } }").is_err());
        assert!(ConfigFragment::parse("{ columns: { id: { description: 1 } } }").is_err());
        assert!(ConfigFragment::parse("{ columns: { id: { bigqueryPolicyTags: [1] } } }").is_err());
        assert!(ConfigFragment::parse("[]").is_err());
    }

    #[test]
    fn opaque_keys_keep_their_position() {
        let fragment = ConfigFragment::parse(
            r#"{
                type: "incremental",
                columns: { id: "id" },
                assertions: { uniqueKey: ["id"], nonNull: ["id"] },
                bigquery: { partitionBy: "DATE(ts)" }
            }"#,
        )
        .unwrap();

        let value = fragment.to_value();
        assert_eq!(keys(&value), ["type", "columns", "assertions", "bigquery"]);
        assert_eq!(value["assertions"], json!({ "uniqueKey": ["id"], "nonNull": ["id"] }));
        assert_eq!(value["columns"], json!({ "id": { "description": "id" } }));
    }

    #[test]
    fn columns_first_and_last() {
        let first = ConfigFragment::parse("{ columns: {}, type: 'view' }").unwrap();
        assert_eq!(keys(&first.to_value()), ["columns", "type"]);

        let last = ConfigFragment::parse("{ type: 'view', columns: {} }").unwrap();
        assert_eq!(keys(&last.to_value()), ["type", "columns"]);
    }

    #[test]
    fn absent_columns_are_appended_only_when_added() {
        let mut fragment = ConfigFragment::parse("{ type: 'table', schema: 'dataform' }").unwrap();
        assert_eq!(keys(&fragment.to_value()), ["type", "schema"]);
        assert_eq!(fragment.schema(), Some("dataform"));

        fragment.columns_mut().insert("id", ColumnRecord::new("id"));
        assert_eq!(keys(&fragment.to_value()), ["type", "schema", "columns"]);
    }

    #[test]
    fn extra_column_keys_survive() {
        let fragment = ConfigFragment::parse(
            "{ columns: { id: { displayName: 'Id', description: 'id', bigqueryPolicyTags: ['t'] } } }",
        )
        .unwrap();
        let id = &fragment.to_value()["columns"]["id"];
        assert_eq!(id, &json!({ "displayName": "Id", "description": "id", "bigqueryPolicyTags": ["t"] }));
        assert_eq!(keys(id), ["displayName", "description", "bigqueryPolicyTags"]);
    }

    #[test]
    fn untouched_object_entries_round_trip() {
        let fragment = ConfigFragment::parse(
            "{ columns: { ts: { bigqueryPolicyTags: 't', displayName: 'Timestamp' }, id: { displayName: 'Id' } } }",
        )
        .unwrap();
        let columns = &fragment.to_value()["columns"];

        assert_eq!(keys(&columns["ts"]), ["bigqueryPolicyTags", "displayName"]);
        assert_eq!(columns["id"], json!({ "displayName": "Id" }));
    }

    #[test]
    fn filled_fields_are_written_first() {
        let mut fragment = ConfigFragment::parse("{ columns: { id: { displayName: 'Id' } } }").unwrap();
        let id = fragment.columns_mut().get_mut("id").unwrap();
        id.description = "identifier".to_string();
        id.policy_tags = Some(vec!["t".to_string()]);

        let id = &fragment.to_value()["columns"]["id"];
        assert_eq!(keys(id), ["description", "bigqueryPolicyTags", "displayName"]);
    }

    #[test]
    fn empty_description_is_kept_when_present() {
        let fragment = ConfigFragment::parse("{ columns: { a: '', b: { description: '' } } }").unwrap();
        let columns = &fragment.to_value()["columns"];
        assert_eq!(columns["a"], json!({ "description": "" }));
        assert_eq!(columns["b"], json!({ "description": "" }));
    }

    #[test]
    fn render_uses_two_space_json() {
        let fragment = ConfigFragment::parse("{ type: 'table', columns: { id: 'id' } }").unwrap();
        assert_eq!(
            fragment.render().unwrap(),
            "config {\n  \"type\": \"table\",\n  \"columns\": {\n    \"id\": {\n      \"description\": \"id\"\n    }\n  }\n}"
        );
    }

    #[test]
    fn reorder_columns() {
        let mut columns = Columns::new();
        columns.insert("c", ColumnRecord::new("c"));
        columns.insert("local_only", ColumnRecord::new(""));
        columns.insert("a", ColumnRecord::new("a"));
        columns.insert("b", ColumnRecord::new("b"));

        columns.reorder(&["a", "b", "missing", "c"]);
        assert_eq!(columns.names(), ["a", "b", "c", "local_only"]);
    }

    #[test]
    fn empty_table_fragment() {
        let fragment = ConfigFragment::empty_table();
        assert_eq!(fragment.kind(), Some(TableKind::Table));
        assert!(fragment.columns().is_empty());
        assert_eq!(fragment.to_value(), json!({ "type": "table" }));
    }

    #[test]
    fn unknown_kind_is_kept_verbatim() {
        let fragment = ConfigFragment::parse("{ type: 'dataPreparation' }").unwrap();
        assert_eq!(fragment.kind(), None);
        assert_eq!(fragment.get("type"), Some(&json!("dataPreparation")));
    }
}

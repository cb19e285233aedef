//! Column merge engine
//!
//! Three fill-only steps, applied per node in topological order:
//! warehouse enrichment, dependency inheritance, then the optional reorder.
//! No step deletes a column or overwrites a non-empty value.

use osmosis_catalog::WarehouseTable;
use osmosis_sqlx::{ColumnRecord, Columns};

/// What a merge step changed, by column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeChanges {
    /// Columns that did not exist locally
    pub added: Vec<String>,

    /// Columns whose empty description was filled
    pub descriptions: Vec<String>,

    /// Columns whose missing policy tags were filled
    pub policy_tags: Vec<String>,
}

impl MergeChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.descriptions.is_empty() && self.policy_tags.is_empty()
    }

    pub fn extend(&mut self, other: MergeChanges) {
        self.added.extend(other.added);
        self.descriptions.extend(other.descriptions);
        self.policy_tags.extend(other.policy_tags);
    }
}

/// Add warehouse columns that are absent locally
///
/// New entries take the warehouse description (empty when unset) and its
/// policy tags when there are any. Existing entries are never touched.
pub fn enrich_from_warehouse(columns: &mut Columns, table: &WarehouseTable) -> MergeChanges {
    let mut changes = MergeChanges::default();

    for field in &table.fields {
        if columns.contains(&field.name) {
            continue;
        }

        let mut record = ColumnRecord::new(field.description.clone().unwrap_or_default());
        record.policy_tags = field.policy_tags.clone();
        columns.insert(field.name.clone(), record);
        changes.added.push(field.name.clone());
    }

    changes
}

/// Inherit metadata from one dependency's columns
///
/// Per column of the dependency:
/// - absent locally: the dependency's entry is copied verbatim
/// - local description empty and the dependency's is not: the description is copied
/// - local has no policy tags and the dependency has some: the tags are copied
///
/// The description and policy tag rules are applied independently.
pub fn inherit_from_dependency(columns: &mut Columns, dependency: &Columns) -> MergeChanges {
    let mut changes = MergeChanges::default();

    for (name, inherited) in dependency.iter() {
        let Some(local) = columns.get_mut(name) else {
            columns.insert(name, inherited.clone());
            changes.added.push(name.to_string());
            continue;
        };

        if local.description.is_empty() && !inherited.description.is_empty() {
            local.description = inherited.description.clone();
            changes.descriptions.push(name.to_string());
        }

        if local.policy_tags.is_none() && inherited.policy_tags.is_some() {
            local.policy_tags = inherited.policy_tags.clone();
            changes.policy_tags.push(name.to_string());
        }
    }

    changes
}

/// Order columns like the warehouse table; unknown columns keep their
/// relative order after the known ones. Returns whether the order changed.
pub fn reorder_to_match(columns: &mut Columns, table: &WarehouseTable) -> bool {
    let before: Vec<String> = columns.names().into_iter().map(str::to_string).collect();
    columns.reorder(&table.column_names());
    columns.names() != before
}

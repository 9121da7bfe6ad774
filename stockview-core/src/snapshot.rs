//! # Dashboard Snapshot
//!
//! The schema model, overrides, route table and menu are built together and
//! published together. Readers clone the current `Arc` and keep using it for
//! the whole request; a rescan builds a new snapshot and swaps it in.

use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::RwLock;

use crate::{
    menu::{build_menu, MenuCategory},
    model::SchemaModel,
    overrides::OverrideSet,
    views::RouteTable,
};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub schema: SchemaModel,
    pub overrides: OverrideSet,
    pub routes: RouteTable,
    pub menu: Vec<MenuCategory>,
    pub built_at: DateTime<Local>,
}

impl Snapshot {
    /// Registers table routes, then custom views, then builds the menu.
    pub fn build(schema: SchemaModel, overrides: OverrideSet) -> Self {
        let routes = RouteTable::build(&schema, &overrides);
        let menu = build_menu(&schema, &overrides, Some(&routes));
        Self { schema, overrides, routes, menu, built_at: Local::now() }
    }

    pub fn empty() -> Self {
        Self::build(SchemaModel::new(), OverrideSet::default())
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { current: RwLock::new(Arc::new(snapshot)) }
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Publishes `snapshot` and returns the one it replaced.
    pub fn store(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        std::mem::replace(&mut *self.current.write(), Arc::new(snapshot))
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableSchema;

    fn model(names: &[&str]) -> SchemaModel {
        names
            .iter()
            .map(|n| {
                let table = TableSchema {
                    name: n.to_string(),
                    columns: vec![],
                    primary_keys: vec![],
                    foreign_keys: vec![],
                    indexes: vec![],
                    sample_data: vec![],
                };
                (n.to_string(), table)
            })
            .collect()
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let cell = SnapshotCell::default();
        let before = cell.load();
        assert!(before.routes.is_empty());

        let next = Snapshot::build(model(&["ORDERS", "RUN_MISSIONI"]), OverrideSet::default());
        let replaced = cell.store(next);
        assert!(Arc::ptr_eq(&before, &replaced));
        assert!(before.schema.is_empty());

        let after = cell.load();
        assert_eq!(after.schema.len(), 2);
        assert_eq!(after.routes.len(), 2);
        assert_eq!(after.menu.len(), 2);
    }
}

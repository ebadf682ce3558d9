use std::collections::{BTreeMap, BTreeSet};

use crate::entity::{Entity, EntityId};
use crate::error::DbError;
use crate::session::UndoStack;

/// Reversible deltas recorded while a session layer is open.
///
/// `new_ids` marks rows inserted in this layer, `old_values` holds the
/// first-touch prior value of modified rows, and `removed` holds rows
/// deleted in this layer, all keyed by raw id. The three id sets stay
/// disjoint. `prior_next_id` restores the allocator on undo.
#[derive(Debug, Clone)]
struct UndoLayer<T: Entity> {
    new_ids: BTreeSet<u64>,
    old_values: BTreeMap<u64, T>,
    removed: BTreeMap<u64, T>,
    prior_next_id: u64,
}

impl<T: Entity> UndoLayer<T> {
    fn new(prior_next_id: u64) -> Self {
        UndoLayer {
            new_ids: BTreeSet::new(),
            old_values: BTreeMap::new(),
            removed: BTreeMap::new(),
            prior_next_id,
        }
    }

    fn on_insert(&mut self, id: u64) {
        self.new_ids.insert(id);
    }

    fn on_modify(&mut self, id: u64, old: T) {
        if self.new_ids.contains(&id) {
            return;
        }
        self.old_values.entry(id).or_insert(old);
    }

    fn on_remove(&mut self, id: u64, old: T) {
        if self.new_ids.remove(&id) {
            return;
        }
        if let Some(prior) = self.old_values.remove(&id) {
            self.removed.insert(id, prior);
            return;
        }
        self.removed.entry(id).or_insert(old);
    }
}

/// A generic multi-indexed entity container.
///
/// One primary index (unique, ordered by id) and one secondary unique
/// index (ordered by `T::Key`). Mutations fail atomically: a uniqueness
/// conflict leaves both indices exactly as they were.
#[derive(Debug, Clone)]
pub struct Table<T: Entity> {
    rows: BTreeMap<u64, T>,
    by_key: BTreeMap<T::Key, u64>,
    next_id: u64,
    undo_stack: Vec<UndoLayer<T>>,
}

impl<T: Entity> Table<T> {
    pub fn new() -> Self {
        Table {
            rows: BTreeMap::new(),
            by_key: BTreeMap::new(),
            next_id: 0,
            undo_stack: Vec::new(),
        }
    }

    /// Construct and insert a new entity under the next id.
    ///
    /// The constructor must store the id it is given. Fails with a
    /// uniqueness conflict if the new secondary key is already taken,
    /// leaving the table untouched.
    pub fn emplace<F>(&mut self, ctor: F) -> Result<EntityId<T>, DbError>
    where
        F: FnOnce(EntityId<T>) -> T,
    {
        let id = EntityId::new(self.next_id);
        let row = ctor(id);
        if row.id() != id {
            return Err(DbError::IdMismatch {
                table: T::TABLE_NAME,
            });
        }

        let key = row.key();
        if self.by_key.contains_key(&key) {
            return Err(DbError::UniqueConflict {
                table: T::TABLE_NAME,
            });
        }

        self.next_id += 1;
        self.by_key.insert(key, id.raw());
        self.rows.insert(id.raw(), row);
        if let Some(layer) = self.undo_stack.last_mut() {
            layer.on_insert(id.raw());
        }
        Ok(id)
    }

    /// Apply a mutation to the entity with the given id.
    ///
    /// The mutator runs against a copy; if the resulting secondary key
    /// collides with a different entity the whole operation is rejected
    /// and no partial mutation is observable.
    pub fn modify<F>(&mut self, id: EntityId<T>, mutator: F) -> Result<(), DbError>
    where
        F: FnOnce(&mut T),
    {
        let current = self.rows.get(&id.raw()).ok_or(DbError::NotFound {
            table: T::TABLE_NAME,
        })?;

        let mut updated = current.clone();
        mutator(&mut updated);
        if updated.id() != id {
            return Err(DbError::IdMismatch {
                table: T::TABLE_NAME,
            });
        }

        let old_key = current.key();
        let new_key = updated.key();
        if new_key != old_key && self.by_key.contains_key(&new_key) {
            return Err(DbError::UniqueConflict {
                table: T::TABLE_NAME,
            });
        }

        let old = current.clone();
        if let Some(layer) = self.undo_stack.last_mut() {
            layer.on_modify(id.raw(), old);
        }
        if new_key != old_key {
            self.by_key.remove(&old_key);
            self.by_key.insert(new_key, id.raw());
        }
        self.rows.insert(id.raw(), updated);
        Ok(())
    }

    /// Remove and return the entity with the given id
    pub fn remove(&mut self, id: EntityId<T>) -> Result<T, DbError> {
        let row = self.rows.remove(&id.raw()).ok_or(DbError::NotFound {
            table: T::TABLE_NAME,
        })?;
        self.by_key.remove(&row.key());
        if let Some(layer) = self.undo_stack.last_mut() {
            layer.on_remove(id.raw(), row.clone());
        }
        Ok(row)
    }

    /// Look up by secondary key
    pub fn find(&self, key: &T::Key) -> Option<&T> {
        let id = self.by_key.get(key)?;
        self.rows.get(id)
    }

    /// Look up by secondary key, failing if absent
    pub fn get(&self, key: &T::Key) -> Result<&T, DbError> {
        self.find(key).ok_or(DbError::NotFound {
            table: T::TABLE_NAME,
        })
    }

    /// Look up by primary id
    pub fn find_by_id(&self, id: EntityId<T>) -> Option<&T> {
        self.rows.get(&id.raw())
    }

    /// Look up by primary id, failing if absent
    pub fn get_by_id(&self, id: EntityId<T>) -> Result<&T, DbError> {
        self.find_by_id(id).ok_or(DbError::NotFound {
            table: T::TABLE_NAME,
        })
    }

    /// Iterate in primary (id) order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// Iterate in secondary (key) order
    pub fn iter_by_key(&self) -> impl Iterator<Item = &T> {
        self.by_key.values().filter_map(|id| self.rows.get(id))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The id the next emplace will assign
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn rows_in_id_order(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub(crate) fn load_rows(next_id: u64, rows: Vec<T>) -> Result<Self, DbError> {
        let mut table = Table::new();
        for row in rows {
            let raw = row.id().raw();
            if raw >= next_id
                || table.rows.contains_key(&raw)
                || table.by_key.contains_key(&row.key())
            {
                return Err(DbError::InvalidSnapshot {
                    table: T::TABLE_NAME.to_string(),
                });
            }
            table.by_key.insert(row.key(), raw);
            table.rows.insert(raw, row);
        }
        table.next_id = next_id;
        Ok(table)
    }
}

impl<T: Entity> UndoStack for Table<T> {
    fn push_layer(&mut self) {
        self.undo_stack.push(UndoLayer::new(self.next_id));
    }

    fn undo_layer(&mut self) {
        let Some(layer) = self.undo_stack.pop() else {
            return;
        };

        // Drop rows created in this layer first so their keys are free
        for id in &layer.new_ids {
            if let Some(row) = self.rows.remove(id) {
                self.by_key.remove(&row.key());
            }
        }

        // Unlink every modified row's current key before re-linking old
        // keys; restored rows may have traded keys within the layer
        for id in layer.old_values.keys() {
            if let Some(current) = self.rows.get(id) {
                self.by_key.remove(&current.key());
            }
        }
        for (id, old) in layer.old_values {
            self.by_key.insert(old.key(), id);
            self.rows.insert(id, old);
        }

        for (id, row) in layer.removed {
            self.by_key.insert(row.key(), id);
            self.rows.insert(id, row);
        }

        self.next_id = layer.prior_next_id;
    }

    fn squash_layer(&mut self) {
        let Some(top) = self.undo_stack.pop() else {
            return;
        };
        let Some(prev) = self.undo_stack.last_mut() else {
            // Root layer: squashing commits, the deltas are discarded
            return;
        };

        for id in top.new_ids {
            prev.new_ids.insert(id);
        }
        for (id, old) in top.old_values {
            if prev.new_ids.contains(&id) {
                continue;
            }
            prev.old_values.entry(id).or_insert(old);
        }
        for (id, row) in top.removed {
            if prev.new_ids.remove(&id) {
                continue;
            }
            if let Some(prior) = prev.old_values.remove(&id) {
                prev.removed.insert(id, prior);
                continue;
            }
            prev.removed.insert(id, row);
        }
    }

    fn depth(&self) -> usize {
        self.undo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: EntityId<Widget>,
        tag: String,
        weight: u64,
    }

    impl Entity for Widget {
        type Key = String;

        const TABLE_NAME: &'static str = "widget";
        const FIELDS: &'static [&'static str] = &["tag", "weight"];

        fn id(&self) -> EntityId<Widget> {
            self.id
        }

        fn key(&self) -> String {
            self.tag.clone()
        }
    }

    fn emplace_widget(table: &mut Table<Widget>, tag: &str, weight: u64) -> EntityId<Widget> {
        table
            .emplace(|id| Widget {
                id,
                tag: tag.to_string(),
                weight,
            })
            .unwrap()
    }

    fn widgets(table: &Table<Widget>) -> Vec<(u64, String, u64)> {
        table
            .iter()
            .map(|w| (w.id.raw(), w.tag.clone(), w.weight))
            .collect()
    }

    #[test]
    fn test_emplace_and_lookup() {
        let mut table = Table::new();
        let id = emplace_widget(&mut table, "alpha", 10);

        let by_id = table.get_by_id(id).unwrap();
        assert_eq!(by_id.tag, "alpha");
        assert_eq!(by_id.weight, 10);

        let by_key = table.get(&"alpha".to_string()).unwrap();
        assert_eq!(by_key.id, id);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "a", 1);
        let b = emplace_widget(&mut table, "b", 2);
        table.remove(a).unwrap();
        let c = emplace_widget(&mut table, "c", 3);
        assert!(a < b && b < c);
        assert_eq!(c.raw(), 2);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut table = Table::new();
        emplace_widget(&mut table, "alpha", 10);

        let result = table.emplace(|id| Widget {
            id,
            tag: "alpha".to_string(),
            weight: 20,
        });
        assert!(matches!(result, Err(DbError::UniqueConflict { .. })));
        assert_eq!(table.len(), 1);
        // A failed emplace must not consume an id
        assert_eq!(table.next_id(), 1);
    }

    #[test]
    fn test_modify_key_collision_rejected() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 10);
        emplace_widget(&mut table, "beta", 20);

        let result = table.modify(a, |w| w.tag = "beta".to_string());
        assert!(matches!(result, Err(DbError::UniqueConflict { .. })));
        // No partial mutation observable
        assert_eq!(table.get_by_id(a).unwrap().tag, "alpha");
        assert_eq!(table.get(&"alpha".to_string()).unwrap().id, a);
    }

    #[test]
    fn test_modify_rekeys_secondary_index() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 10);

        table.modify(a, |w| w.tag = "gamma".to_string()).unwrap();
        assert!(table.find(&"alpha".to_string()).is_none());
        assert_eq!(table.get(&"gamma".to_string()).unwrap().id, a);
    }

    #[test]
    fn test_missing_id_is_not_found() {
        let mut table: Table<Widget> = Table::new();
        let id = emplace_widget(&mut table, "alpha", 1);
        table.remove(id).unwrap();

        assert!(matches!(
            table.modify(id, |w| w.weight = 2),
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(table.remove(id), Err(DbError::NotFound { .. })));
        assert!(matches!(
            table.get(&"alpha".to_string()),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn test_iteration_orders() {
        let mut table = Table::new();
        emplace_widget(&mut table, "zeta", 1);
        emplace_widget(&mut table, "alpha", 2);

        let id_order: Vec<_> = table.iter().map(|w| w.tag.clone()).collect();
        assert_eq!(id_order, vec!["zeta", "alpha"]);

        let key_order: Vec<_> = table.iter_by_key().map(|w| w.tag.clone()).collect();
        assert_eq!(key_order, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_undo_restores_exact_state() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 10);
        let b = emplace_widget(&mut table, "beta", 20);
        let before = widgets(&table);
        let next_before = table.next_id();

        {
            let mut session = Session::new(&mut table);
            emplace_widget(&mut session, "gamma", 30);
            session.modify(a, |w| w.weight = 11).unwrap();
            session.remove(b).unwrap();
            session.undo();
        }

        assert_eq!(widgets(&table), before);
        assert_eq!(table.next_id(), next_before);
        assert_eq!(table.get(&"beta".to_string()).unwrap().weight, 20);
    }

    #[test]
    fn test_undo_on_drop() {
        let mut table = Table::new();
        emplace_widget(&mut table, "alpha", 10);

        {
            let mut session = Session::new(&mut table);
            emplace_widget(&mut session, "beta", 20);
            // Dropped without squash: rolls back
        }

        assert_eq!(table.len(), 1);
        assert_eq!(table.next_id(), 1);
    }

    #[test]
    fn test_undo_restores_traded_keys() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 1);
        let b = emplace_widget(&mut table, "beta", 2);

        {
            let mut session = Session::new(&mut table);
            session.modify(a, |w| w.tag = "tmp".to_string()).unwrap();
            session.modify(b, |w| w.tag = "alpha".to_string()).unwrap();
            session.modify(a, |w| w.tag = "beta".to_string()).unwrap();
            session.undo();
        }

        assert_eq!(table.get(&"alpha".to_string()).unwrap().id, a);
        assert_eq!(table.get(&"beta".to_string()).unwrap().id, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_undo_remove_then_reuse_key() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 1);

        {
            let mut session = Session::new(&mut table);
            session.remove(a).unwrap();
            emplace_widget(&mut session, "alpha", 99);
            session.undo();
        }

        let restored = table.get(&"alpha".to_string()).unwrap();
        assert_eq!(restored.id, a);
        assert_eq!(restored.weight, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_squash_merges_into_parent() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 10);

        {
            let mut outer = Session::new(&mut table);
            {
                let mut inner = Session::new(&mut *outer);
                inner.modify(a, |w| w.weight = 11).unwrap();
                emplace_widget(&mut inner, "beta", 20);
                inner.squash();
            }
            // Inner changes survive the squash and are visible in outer
            assert_eq!(outer.get_by_id(a).unwrap().weight, 11);
            assert_eq!(outer.len(), 2);
            outer.undo();
        }

        // Undoing the outer session reverts the squashed inner changes too
        assert_eq!(table.get_by_id(a).unwrap().weight, 10);
        assert_eq!(table.len(), 1);
        assert_eq!(table.next_id(), 1);
    }

    #[test]
    fn test_squash_root_commits() {
        let mut table = Table::new();

        {
            let mut session = Session::new(&mut table);
            emplace_widget(&mut session, "alpha", 10);
            session.squash();
        }

        assert_eq!(table.len(), 1);
        assert_eq!(table.depth(), 0);
    }

    #[test]
    fn test_squash_equals_direct_application() {
        // Nested A inside B, squash A then B: same as mutating directly
        let mut direct = Table::new();
        let d = emplace_widget(&mut direct, "alpha", 10);
        direct.modify(d, |w| w.weight = 42).unwrap();
        emplace_widget(&mut direct, "beta", 7);

        let mut layered = Table::new();
        let l = emplace_widget(&mut layered, "alpha", 10);
        {
            let mut b = Session::new(&mut layered);
            {
                let mut a = Session::new(&mut *b);
                a.modify(l, |w| w.weight = 42).unwrap();
                emplace_widget(&mut a, "beta", 7);
                a.squash();
            }
            b.squash();
        }

        assert_eq!(widgets(&direct), widgets(&layered));
        assert_eq!(direct.next_id(), layered.next_id());
    }

    #[test]
    fn test_inner_undo_preserves_outer_changes() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 10);

        {
            let mut outer = Session::new(&mut table);
            outer.modify(a, |w| w.weight = 20).unwrap();
            {
                let mut inner = Session::new(&mut *outer);
                inner.modify(a, |w| w.weight = 30).unwrap();
                inner.undo();
            }
            assert_eq!(outer.get_by_id(a).unwrap().weight, 20);
            outer.squash();
        }

        assert_eq!(table.get_by_id(a).unwrap().weight, 20);
    }

    #[test]
    fn test_squash_remove_of_modified_row() {
        let mut table = Table::new();
        let a = emplace_widget(&mut table, "alpha", 10);

        {
            let mut outer = Session::new(&mut table);
            outer.modify(a, |w| w.weight = 20).unwrap();
            {
                let mut inner = Session::new(&mut *outer);
                inner.remove(a).unwrap();
                inner.squash();
            }
            outer.undo();
        }

        // The original value, not the outer-modified one, comes back
        assert_eq!(table.get_by_id(a).unwrap().weight, 10);
    }

    #[test]
    fn test_squash_insert_then_remove_cancels() {
        let mut table: Table<Widget> = Table::new();

        {
            let mut outer = Session::new(&mut table);
            let b = emplace_widget(&mut outer, "beta", 1);
            {
                let mut inner = Session::new(&mut *outer);
                inner.remove(b).unwrap();
                inner.squash();
            }
            outer.squash();
        }

        assert!(table.is_empty());
    }
}

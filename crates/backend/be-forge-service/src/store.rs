//! Record storage for the forge resources.
//!
//! Each resource gets its own store instance, created by the caller and
//! handed to [`crate::ForgeState`]. The in-memory implementation keeps
//! insertion order so listings are stable.

use indexmap::IndexMap;
use parking_lot::RwLock;
use uuid::Uuid;

pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

pub trait RecordStore<T: Record>: Send + Sync {
    /// Inserts or replaces the record with the same id.
    fn insert(&self, record: T);

    fn get(&self, id: Uuid) -> Option<T>;

    /// All records, oldest first.
    fn list(&self) -> Vec<T>;

    fn remove(&self, id: Uuid) -> Option<T>;

    /// Applies `apply` to the stored record and returns the updated copy.
    fn update(&self, id: Uuid, apply: &mut dyn FnMut(&mut T)) -> Option<T>;
}

pub struct MemoryStore<T> {
    records: RwLock<IndexMap<Uuid, T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> RecordStore<T> for MemoryStore<T> {
    fn insert(&self, record: T) {
        self.records.write().insert(record.id(), record);
    }

    fn get(&self, id: Uuid) -> Option<T> {
        self.records.read().get(&id).cloned()
    }

    fn list(&self) -> Vec<T> {
        self.records.read().values().cloned().collect()
    }

    fn remove(&self, id: Uuid) -> Option<T> {
        self.records.write().shift_remove(&id)
    }

    fn update(&self, id: Uuid, apply: &mut dyn FnMut(&mut T)) -> Option<T> {
        let mut records = self.records.write();
        let record = records.get_mut(&id)?;
        apply(record);
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: Uuid,
        body: String,
    }

    impl Record for Note {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn note(body: &str) -> Note {
        Note {
            id: Uuid::now_v7(),
            body: body.to_string(),
        }
    }

    #[test]
    fn list_keeps_insertion_order_after_removal() {
        let store = MemoryStore::new();
        let (a, b, c) = (note("a"), note("b"), note("c"));
        store.insert(a.clone());
        store.insert(b.clone());
        store.insert(c.clone());

        assert_eq!(store.remove(b.id), Some(b));
        assert_eq!(store.list(), vec![a, c]);
    }

    #[test]
    fn update_returns_the_modified_record() {
        let store = MemoryStore::new();
        let a = note("draft");
        store.insert(a.clone());

        let updated = store
            .update(a.id, &mut |n: &mut Note| n.body = "final".into())
            .unwrap();

        assert_eq!(updated.body, "final");
        assert_eq!(store.get(a.id).unwrap().body, "final");
    }

    #[test]
    fn missing_ids_are_none() {
        let store: MemoryStore<Note> = MemoryStore::new();
        let id = Uuid::now_v7();

        assert!(store.get(id).is_none());
        assert!(store.remove(id).is_none());
        assert!(store.update(id, &mut |_| {}).is_none());
    }

    #[test]
    fn stores_are_independent() {
        let first = MemoryStore::new();
        let second: MemoryStore<Note> = MemoryStore::new();
        first.insert(note("only here"));

        assert_eq!(first.list().len(), 1);
        assert!(second.list().is_empty());
    }
}

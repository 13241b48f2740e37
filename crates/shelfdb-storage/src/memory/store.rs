//! Record and index storage of a single object store.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use shelfdb_common::key::MAX_SAFE_INTEGER;
use shelfdb_common::{Key, KeyPath, KeyQuery, KeyRange, Result, ShelfError, Value};

use crate::schema::{IndexSchema, StoreSchema};
use crate::traits::CursorDirection;

/// Largest key a generator hands out.
const MAX_GENERATED_KEY: u64 = MAX_SAFE_INTEGER;

/// How a write treats an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Add,
    Put,
}

/// What a successful write changed, for the undo log.
#[derive(Debug)]
pub(crate) struct WriteOutcome {
    pub key: Key,
    pub previous: Option<Value>,
    /// Generator value before the write, when the write moved it.
    pub previous_generator: Option<u64>,
}

#[derive(Debug)]
pub(crate) struct IndexData {
    pub schema: IndexSchema,
    key_path: KeyPath,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexData {
    fn new(schema: IndexSchema) -> Self {
        Self {
            key_path: schema.resolved_key_path(),
            schema,
            entries: BTreeMap::new(),
        }
    }

    /// Index keys a record contributes. Records without a valid key at the
    /// key path contribute none.
    fn keys_for(&self, value: &Value) -> Vec<Key> {
        if !self.schema.multi_entry {
            return self.key_path.extract(value).into_iter().collect();
        }
        match self.key_path.extract_value(value) {
            Some(Value::Array(items)) => {
                let keys: BTreeSet<Key> = items.iter().filter_map(Key::from_value).collect();
                keys.into_iter().collect()
            }
            Some(other) => Key::from_value(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn insert(&mut self, index_key: Key, primary_key: Key) {
        self.entries.entry(index_key).or_default().insert(primary_key);
    }

    fn remove(&mut self, index_key: &Key, primary_key: &Key) {
        if let Some(keys) = self.entries.get_mut(index_key) {
            keys.remove(primary_key);
            if keys.is_empty() {
                self.entries.remove(index_key);
            }
        }
    }

    /// Whether `index_key` is taken by a record other than `primary_key`.
    fn conflicts(&self, index_key: &Key, primary_key: &Key) -> bool {
        self.entries
            .get(index_key)
            .is_some_and(|keys| keys.iter().any(|k| k != primary_key))
    }

    fn first_match(&self, query: &KeyQuery) -> Option<&Key> {
        let range = query.to_range();
        checked_range(&self.entries, range.start_bound(), range.end_bound())
            .find_map(|(_, keys)| keys.iter().next())
    }

    fn count(&self, range: Option<&KeyRange>) -> u64 {
        match range {
            Some(range) => checked_range(&self.entries, range.start_bound(), range.end_bound())
                .map(|(_, keys)| keys.len() as u64)
                .sum(),
            None => self.entries.values().map(|keys| keys.len() as u64).sum(),
        }
    }

    /// Entry following `after` in cursor order.
    fn step(
        &self,
        after: Option<(&Key, &Key)>,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> Option<(Key, Key)> {
        let (start, end) = bounds(range);
        match (direction, after) {
            (CursorDirection::Next, None) => checked_range(&self.entries, start, end)
                .find_map(|(k, keys)| keys.iter().next().map(|pk| (k.clone(), pk.clone()))),
            (CursorDirection::Next, Some((index_key, primary_key))) => {
                let same = self.entries.get(index_key).and_then(|keys| {
                    keys.range::<Key, _>((Bound::Excluded(primary_key), Bound::Unbounded))
                        .next()
                });
                if let Some(pk) = same {
                    return Some((index_key.clone(), pk.clone()));
                }
                checked_range(&self.entries, Bound::Excluded(index_key), end)
                    .find_map(|(k, keys)| keys.iter().next().map(|pk| (k.clone(), pk.clone())))
            }
            (CursorDirection::Prev, None) => checked_range(&self.entries, start, end)
                .rev()
                .find_map(|(k, keys)| keys.iter().next_back().map(|pk| (k.clone(), pk.clone()))),
            (CursorDirection::Prev, Some((index_key, primary_key))) => {
                let same = self.entries.get(index_key).and_then(|keys| {
                    keys.range::<Key, _>((Bound::Unbounded, Bound::Excluded(primary_key)))
                        .next_back()
                });
                if let Some(pk) = same {
                    return Some((index_key.clone(), pk.clone()));
                }
                checked_range(&self.entries, start, Bound::Excluded(index_key))
                    .rev()
                    .find_map(|(k, keys)| keys.iter().next_back().map(|pk| (k.clone(), pk.clone())))
            }
        }
    }
}

/// Contents of one object store.
#[derive(Debug)]
pub(crate) struct StoreData {
    pub schema: StoreSchema,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexData>,
    /// Next generated key.
    key_generator: u64,
}

impl StoreData {
    pub fn new(schema: StoreSchema) -> Result<Self> {
        schema.validate()?;
        let indexes = schema
            .indexes
            .iter()
            .map(|index| (index.name.clone(), IndexData::new(index.clone())))
            .collect();
        Ok(Self {
            schema,
            records: BTreeMap::new(),
            indexes,
            key_generator: 1,
        })
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn index_schema(&self, name: &str) -> Option<IndexSchema> {
        self.indexes.get(name).map(|index| index.schema.clone())
    }

    /// Add an index and populate it from the existing records.
    pub fn create_index(&mut self, schema: IndexSchema) -> Result<()> {
        if self.indexes.contains_key(&schema.name) {
            return Err(ShelfError::constraint(format!(
                "index '{}' already exists on store '{}'",
                schema.name, self.schema.name
            )));
        }
        schema.validate()?;

        let mut index = IndexData::new(schema.clone());
        for (primary_key, value) in &self.records {
            for index_key in index.keys_for(value) {
                if index.schema.unique && index.conflicts(&index_key, primary_key) {
                    return Err(ShelfError::constraint(format!(
                        "existing records violate unique index '{}'",
                        schema.name
                    )));
                }
                index.insert(index_key, primary_key.clone());
            }
        }
        self.schema.indexes.push(schema.clone());
        self.indexes.insert(schema.name, index);
        Ok(())
    }

    pub fn get(&self, query: &KeyQuery) -> Option<Value> {
        match query {
            KeyQuery::Key(key) => self.records.get(key).cloned(),
            KeyQuery::Range(range) => self.records_in(Some(range)).next().map(|(_, v)| v.clone()),
        }
    }

    pub fn get_all(&self, range: Option<&KeyRange>) -> Vec<Value> {
        self.records_in(range).map(|(_, v)| v.clone()).collect()
    }

    pub fn count(&self, range: Option<&KeyRange>) -> u64 {
        match range {
            None => self.records.len() as u64,
            Some(_) => self.records_in(range).count() as u64,
        }
    }

    pub fn index_get(&self, index: &str, query: &KeyQuery) -> Option<Value> {
        let index = self.indexes.get(index)?;
        index
            .first_match(query)
            .and_then(|primary_key| self.records.get(primary_key))
            .cloned()
    }

    pub fn index_count(&self, index: &str, range: Option<&KeyRange>) -> u64 {
        self.indexes.get(index).map_or(0, |index| index.count(range))
    }

    fn records_in(&self, range: Option<&KeyRange>) -> impl DoubleEndedIterator<Item = (&Key, &Value)> {
        let (start, end) = bounds(range);
        checked_range(&self.records, start, end)
    }

    /// Insert or overwrite a record.
    ///
    /// Every check runs before anything is modified, so a failed write
    /// leaves the store untouched.
    pub fn write(&mut self, mut value: Value, explicit_key: Option<Key>, mode: WriteMode) -> Result<WriteOutcome> {
        let mut generated = false;
        let key = match (&self.schema.key_path, explicit_key) {
            (Some(_), Some(_)) => {
                return Err(ShelfError::data(
                    "the object store uses in-line keys and a key was provided",
                ));
            }
            (None, Some(key)) => key,
            (Some(path), None) => match path.extract(&value) {
                Some(key) => key,
                None if self.schema.auto_increment => {
                    if let KeyPath::Single(field) = path {
                        if value.get_path(field).is_some() {
                            return Err(ShelfError::data(format!(
                                "the value at key path '{path}' is not a valid key"
                            )));
                        }
                    }
                    generated = true;
                    self.peek_generated()?
                }
                None => {
                    return Err(ShelfError::data(format!(
                        "evaluating key path '{path}' did not yield a valid key"
                    )));
                }
            },
            (None, None) if self.schema.auto_increment => {
                generated = true;
                self.peek_generated()?
            }
            (None, None) => {
                return Err(ShelfError::data(
                    "the object store uses out-of-line keys and no key was provided",
                ));
            }
        };

        if generated {
            if let Some(KeyPath::Single(field)) = &self.schema.key_path {
                if !value.set_path(field, key.to_value()) {
                    return Err(ShelfError::data(format!(
                        "cannot inject the generated key at key path '{field}'"
                    )));
                }
            }
        }

        if mode == WriteMode::Add && self.records.contains_key(&key) {
            return Err(ShelfError::constraint(format!(
                "a record with key {key} already exists in store '{}'",
                self.schema.name
            )));
        }

        let mut new_entries = Vec::new();
        for (name, index) in &self.indexes {
            for index_key in index.keys_for(&value) {
                if index.schema.unique && index.conflicts(&index_key, &key) {
                    return Err(ShelfError::constraint(format!(
                        "unique index '{name}' already contains key {index_key}"
                    )));
                }
                new_entries.push((name.clone(), index_key));
            }
        }

        let previous_generator = self.advance_generator(&key, generated);
        let previous = self.remove_record(&key);
        for (name, index_key) in new_entries {
            if let Some(index) = self.indexes.get_mut(&name) {
                index.insert(index_key, key.clone());
            }
        }
        self.records.insert(key.clone(), value);

        Ok(WriteOutcome {
            key,
            previous,
            previous_generator,
        })
    }

    /// Delete every record matching the query, returning what was removed.
    pub fn delete(&mut self, query: &KeyQuery) -> Vec<(Key, Value)> {
        let keys: Vec<Key> = match query {
            KeyQuery::Key(key) => self.records.contains_key(key).then(|| key.clone()).into_iter().collect(),
            KeyQuery::Range(range) => self.records_in(Some(range)).map(|(k, _)| k.clone()).collect(),
        };
        keys.into_iter()
            .filter_map(|key| self.remove_record(&key).map(|value| (key, value)))
            .collect()
    }

    pub fn clear(&mut self) -> Vec<(Key, Value)> {
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
        std::mem::take(&mut self.records).into_iter().collect()
    }

    /// Put a record back to an earlier state without any checks.
    pub fn restore(&mut self, key: Key, previous: Option<Value>) {
        self.remove_record(&key);
        if let Some(value) = previous {
            for index in self.indexes.values_mut() {
                for index_key in index.keys_for(&value) {
                    index.insert(index_key, key.clone());
                }
            }
            self.records.insert(key, value);
        }
    }

    pub fn restore_generator(&mut self, value: u64) {
        self.key_generator = value;
    }

    /// Record following `after` in cursor order.
    pub fn step_records(
        &self,
        after: Option<&Key>,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> Option<(Key, Value)> {
        let (start, end) = bounds(range);
        let entry = match (direction, after) {
            (CursorDirection::Next, None) => checked_range(&self.records, start, end).next(),
            (CursorDirection::Next, Some(key)) => {
                checked_range(&self.records, Bound::Excluded(key), end).next()
            }
            (CursorDirection::Prev, None) => checked_range(&self.records, start, end).next_back(),
            (CursorDirection::Prev, Some(key)) => {
                checked_range(&self.records, start, Bound::Excluded(key)).next_back()
            }
        };
        entry.map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Index entry following `after` in cursor order, with its record.
    pub fn step_index(
        &self,
        index: &str,
        after: Option<(&Key, &Key)>,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> Option<(Key, Key, Value)> {
        let index = self.indexes.get(index)?;
        let mut position = after.map(|(k, pk)| (k.clone(), pk.clone()));
        loop {
            let (index_key, primary_key) = index.step(
                position.as_ref().map(|(k, pk)| (k, pk)),
                range,
                direction,
            )?;
            if let Some(value) = self.records.get(&primary_key) {
                return Some((index_key, primary_key, value.clone()));
            }
            position = Some((index_key, primary_key));
        }
    }

    fn peek_generated(&self) -> Result<Key> {
        if self.key_generator > MAX_GENERATED_KEY {
            return Err(ShelfError::constraint(format!(
                "the key generator of store '{}' is exhausted",
                self.schema.name
            )));
        }
        Ok(Key::Number(self.key_generator as f64))
    }

    /// Move the generator past `key`. Returns the old value if it changed.
    fn advance_generator(&mut self, key: &Key, generated: bool) -> Option<u64> {
        if !self.schema.auto_increment {
            return None;
        }
        let previous = self.key_generator;
        if generated {
            self.key_generator += 1;
        } else if let Some(n) = key.as_number() {
            if n >= self.key_generator as f64 {
                let next = n.floor() + 1.0;
                self.key_generator = if next > MAX_GENERATED_KEY as f64 {
                    MAX_GENERATED_KEY + 1
                } else {
                    next as u64
                };
            }
        }
        (self.key_generator != previous).then_some(previous)
    }

    fn remove_record(&mut self, key: &Key) -> Option<Value> {
        let value = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            for index_key in index.keys_for(&value) {
                index.remove(&index_key, key);
            }
        }
        Some(value)
    }
}

fn bounds(range: Option<&KeyRange>) -> (Bound<&Key>, Bound<&Key>) {
    match range {
        Some(range) => (range.start_bound(), range.end_bound()),
        None => (Bound::Unbounded, Bound::Unbounded),
    }
}

/// `BTreeMap::range` that yields nothing instead of panicking on bounds
/// that cross.
fn checked_range<'a, V>(
    map: &'a BTreeMap<Key, V>,
    start: Bound<&Key>,
    end: Bound<&Key>,
) -> std::collections::btree_map::Range<'a, Key, V> {
    let valid = match (start, end) {
        (
            Bound::Included(s) | Bound::Excluded(s),
            Bound::Included(e) | Bound::Excluded(e),
        ) => match s.cmp(e) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => {
                !(matches!(start, Bound::Excluded(_)) && matches!(end, Bound::Excluded(_)))
            }
            std::cmp::Ordering::Greater => false,
        },
        _ => true,
    };
    if valid {
        map.range::<Key, _>((start, end))
    } else {
        Default::default()
    }
}

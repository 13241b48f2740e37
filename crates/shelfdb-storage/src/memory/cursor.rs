use std::sync::Arc;

use async_trait::async_trait;
use shelfdb_common::{Key, KeyRange, Result};

use super::StoreSlot;
use super::transaction::TxInner;
use crate::traits::{Cursor, CursorDirection, CursorEntry};

#[derive(Debug, Clone)]
pub(crate) enum CursorSource {
    Store,
    Index(String),
}

/// Cursor over a store or index range.
///
/// The cursor only remembers its last position, so records written while
/// it is open are visited if they sort after that position.
#[derive(Debug)]
pub struct MemoryCursor {
    tx: Arc<TxInner>,
    slot: Arc<StoreSlot>,
    source: CursorSource,
    range: Option<KeyRange>,
    direction: CursorDirection,
    /// Last `(key, primary key)` returned.
    position: Option<(Key, Key)>,
    exhausted: bool,
}

impl MemoryCursor {
    pub(crate) fn new(
        tx: Arc<TxInner>,
        slot: Arc<StoreSlot>,
        source: CursorSource,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Self {
        Self {
            tx,
            slot,
            source,
            range,
            direction,
            position: None,
            exhausted: false,
        }
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<CursorEntry>> {
        self.tx.ensure_active()?;
        if self.exhausted {
            return Ok(None);
        }

        let entry = {
            let data = self.slot.data.lock();
            match &self.source {
                CursorSource::Store => data
                    .step_records(
                        self.position.as_ref().map(|(key, _)| key),
                        self.range.as_ref(),
                        self.direction,
                    )
                    .map(|(key, value)| CursorEntry {
                        primary_key: key.clone(),
                        key,
                        value,
                    }),
                CursorSource::Index(index) => data
                    .step_index(
                        index,
                        self.position.as_ref().map(|(key, pk)| (key, pk)),
                        self.range.as_ref(),
                        self.direction,
                    )
                    .map(|(key, primary_key, value)| CursorEntry {
                        key,
                        primary_key,
                        value,
                    }),
            }
        };

        match &entry {
            Some(entry) => {
                self.position = Some((entry.key.clone(), entry.primary_key.clone()));
            }
            None => self.exhausted = true,
        }
        Ok(entry)
    }
}

use std::collections::HashMap;

use crate::model::page::PageRecord;

/// Pages fetched for the current chapter epoch.
///
/// The epoch advances on every [`PageCache::clear`]; writes tagged with an
/// older epoch are refused so late responses cannot repopulate a reset cache.
#[derive(Debug, Default)]
pub struct PageCache {
    pages: HashMap<u32, PageRecord>,
    epoch: u64,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn get(&self, page_number: u32) -> Option<&PageRecord> {
        self.pages.get(&page_number)
    }

    pub fn contains(&self, page_number: u32) -> bool {
        self.pages.contains_key(&page_number)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Store `record` under `page_number` if `epoch` is still current.
    /// Returns whether it was stored.
    pub fn insert(&mut self, epoch: u64, page_number: u32, record: PageRecord) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.pages.insert(page_number, record);
        true
    }

    /// Drop every page and start a new epoch.
    pub fn clear(&mut self) -> u64 {
        self.pages.clear();
        self.epoch += 1;
        self.epoch
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.pages.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }
}

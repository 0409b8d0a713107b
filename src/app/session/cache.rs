use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::db::MediaFile;

/// Last known play state per filepath, shared by the tick loop and the shutdown flush.
#[derive(Debug, Default)]
pub(crate) struct SessionCache {
    entries: RwLock<HashMap<String, MediaFile>>,
}

impl SessionCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, key: &str, value: MediaFile) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<MediaFile> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn delete(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

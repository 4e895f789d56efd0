use std::sync::RwLock;

/// A lazily filled lookup value shared by all objects of one configuration.
///
/// Holds nothing until [`LookupCache::set`] is called and can be emptied again
/// with [`LookupCache::reset`].
#[derive(Debug, Default)]
pub struct LookupCache<T> {
    value: RwLock<Option<T>>,
}

impl<T: Clone> LookupCache<T> {
    pub fn new() -> Self {
        LookupCache {
            value: RwLock::new(None),
        }
    }

    /// Returns a copy of the cached value, if any.
    pub fn get(&self) -> Option<T> {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the cached value.
    pub fn set(&self, value: T) {
        match self.value.write() {
            Ok(mut guard) => *guard = Some(value),
            Err(poisoned) => *poisoned.into_inner() = Some(value),
        }
    }

    /// Empties the cache.
    pub fn reset(&self) {
        match self.value.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_lookup_cache_get_set_reset() {
        let cache: LookupCache<HashMap<String, String>> = LookupCache::new();
        assert!(cache.get().is_none());

        cache.set(HashMap::from([("xls".to_string(), "xlsx".to_string())]));
        assert_eq!(cache.get().unwrap()["xls"], "xlsx");

        cache.reset();
        assert!(cache.get().is_none());
    }
}

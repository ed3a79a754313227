use std::collections::HashMap;

use crate::model::{Activity, ActivityId};

/// Keyed registry of activities. Iteration order carries no meaning;
/// callers that need an order go through [`crate::views`].
#[derive(Debug, Default, Clone)]
pub struct EntityCache {
    entries: HashMap<ActivityId, Activity>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ActivityId) -> Option<&Activity> {
        self.entries.get(id)
    }

    /// Insert-or-replace keyed by the activity's own id. Returns the replaced entry.
    pub fn put(&mut self, activity: Activity) -> Option<Activity> {
        self.entries.insert(activity.id.clone(), activity)
    }

    pub fn remove(&mut self, id: &ActivityId) -> Option<Activity> {
        self.entries.remove(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &Activity> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ActivityId> {
        self.entries.keys()
    }

    pub fn contains(&self, id: &ActivityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_wire_date, ActivityDraft};

    fn activity(id: &str, title: &str) -> Activity {
        let date = parse_wire_date("2024-01-05T08:00:00").unwrap();
        ActivityDraft::new(title, date).into_activity(ActivityId::new(id))
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = EntityCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.values().count(), 0);
    }

    #[test]
    fn put_replaces_same_id() {
        let mut cache = EntityCache::new();
        assert!(cache.put(activity("a", "first")).is_none());

        let replaced = cache.put(activity("a", "second")).unwrap();

        assert_eq!(replaced.title, "first");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&ActivityId::new("a")).unwrap().title, "second");
    }

    #[test]
    fn remove_returns_entry() {
        let mut cache = EntityCache::new();
        cache.put(activity("a", "run"));

        let removed = cache.remove(&ActivityId::new("a"));

        assert_eq!(removed.map(|a| a.title), Some("run".to_string()));
        assert!(!cache.contains(&ActivityId::new("a")));
    }

    #[test]
    fn remove_missing_is_none() {
        let mut cache = EntityCache::new();
        assert!(cache.remove(&ActivityId::new("nope")).is_none());
    }

    #[test]
    fn ids_match_entries() {
        let mut cache = EntityCache::new();
        cache.put(activity("a", "one"));
        cache.put(activity("b", "two"));

        let mut ids: Vec<_> = cache.ids().map(ActivityId::as_str).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec!["a", "b"]);
    }
}

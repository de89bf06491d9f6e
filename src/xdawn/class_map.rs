//! Insertion-ordered mapping from event name to a per-class value.
use std::ops::Index;

/// Per-class results keyed by event name, iterated in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for ClassMap<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> ClassMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<T> Index<&str> for ClassMap<T> {
    type Output = T;

    fn index(&self, name: &str) -> &T {
        self.get(name)
            .unwrap_or_else(|| panic!("no class named '{name}'"))
    }
}

impl<T> FromIterator<(String, T)> for ClassMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut map = ClassMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<T> IntoIterator for ClassMap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_replaces_in_place() {
        let mut m = ClassMap::new();
        m.insert("target", 1);
        m.insert("standard", 2);
        m.insert("target", 3);
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["target", "standard"]);
        assert_eq!(m["target"], 3);
        assert_eq!(m.get("novel"), None);
        assert_eq!(m.len(), 2);
    }
}

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    sync::{Arc, PoisonError, RwLock},
};

use lazy_static::lazy_static;

lazy_static! {
    static ref INTERNED_KEYS: RwLock<HashMap<Arc<str>, Name>> = RwLock::new(HashMap::new());
}

/// An interned string, used for Key SMILES that join records across rows.
///
/// Equal strings share one allocation, so equality between interned names is
/// usually a pointer comparison.
#[derive(Clone)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(name: &str) -> Self {
        if let Some(existing) = INTERNED_KEYS
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return existing.clone();
        }
        let mut names = INTERNED_KEYS.write().unwrap_or_else(PoisonError::into_inner);
        names
            .entry(Arc::from(name))
            .or_insert_with_key(|key| Name(key.clone()))
            .clone()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of distinct strings interned so far.
    pub fn interned_count() -> usize {
        INTERNED_KEYS
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::new(&s)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0.cmp(&other.0)
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{:?}", &*self.0)
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_allocation() {
        let a = Name::new("[1*]c1ccccc1");
        let b = Name::from("[1*]c1ccccc1".to_string());
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "[1*]c1ccccc1");
        assert!(Name::interned_count() >= 1);
    }

    #[test]
    fn test_ordering_follows_strings() {
        let mut names: Vec<Name> = ["[1*]O", "[1*]C", "[1*]N"].into_iter().map(Name::new).collect();
        names.sort();
        let sorted: Vec<&str> = names.iter().map(Name::as_str).collect();
        assert_eq!(sorted, ["[1*]C", "[1*]N", "[1*]O"]);
    }
}

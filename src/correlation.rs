use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

/// Which output rows each input row produced, for cross-highlighting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationMap {
    rows: BTreeMap<String, BTreeSet<String>>,
    #[serde(skip)]
    parents: BTreeMap<String, String>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: &str, child: &str) {
        self.rows
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.parents.insert(child.to_string(), parent.to_string());
    }

    pub fn children(&self, parent: &str) -> Option<&BTreeSet<String>> {
        self.rows.get(parent)
    }

    pub fn parent(&self, child: &str) -> Option<&str> {
        self.parents.get(child).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn save<W: Write>(&self, output: W) -> Result<()> {
        serde_json::to_writer_pretty(output, &self.rows)?;
        Ok(())
    }

    pub fn load<R: Read>(input: R) -> Result<Self> {
        let rows: BTreeMap<String, BTreeSet<String>> = serde_json::from_reader(input)?;
        let parents = rows
            .iter()
            .flat_map(|(parent, children)| {
                children
                    .iter()
                    .map(move |child| (child.clone(), parent.clone()))
            })
            .collect();
        Ok(Self { rows, parents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_survive_a_round_trip() {
        let mut map = CorrelationMap::new();
        map.insert("Row0", "Row0_0");
        map.insert("Row0", "Row0_1");
        map.insert("Row1", "Row1_0");
        assert_eq!(map.len(), 2);
        assert_eq!(map.parent("Row0_1"), Some("Row0"));

        let mut json = Vec::new();
        map.save(&mut json).unwrap();
        let loaded = CorrelationMap::load(json.as_slice()).unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.children("Row0").map(BTreeSet::len), Some(2));
        assert_eq!(loaded.parent("Row1_0"), Some("Row1"));
        assert_eq!(loaded.parent("Row2_0"), None);
    }
}

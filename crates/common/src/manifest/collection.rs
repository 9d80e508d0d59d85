use serde::{Deserialize, Serialize};

use crate::storage::FileEntry;

/// A titled group of published items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub title: String,
    pub items: Vec<CollectionItem>,
}

/// An item is either an ingested file or a plain link string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectionItem {
    File(FileEntry),
    Link(String),
}

impl Collection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn with_file(mut self, entry: FileEntry) -> Self {
        self.items.push(CollectionItem::File(entry));
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.items.push(CollectionItem::Link(link.into()));
        self
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.items.iter().filter_map(|item| match item {
            CollectionItem::File(entry) => Some(entry),
            CollectionItem::Link(_) => None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_untagged_items() {
        let json = r#"{
            "title": "mixed",
            "items": [
                "https://example.com/readme",
                {"name": "empty.txt", "size": 0, "chunks": []}
            ]
        }"#;
        let collection: Collection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.items.len(), 2);
        assert!(matches!(collection.items[0], CollectionItem::Link(_)));
        let files: Vec<_> = collection.files().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "empty.txt");
    }
}

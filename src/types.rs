use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Shared editable text record, as stored under the `files` collection.
///
/// `id` is the key of the record and is never part of the stored value.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default, deserialize_with = "sequence_or_map")]
    pub allowed_users: Vec<String>,
    #[serde(default, deserialize_with = "sequence_or_map")]
    pub version_history: Vec<Version>,
}

impl Document {
    pub fn new(id: String, file_name: String, creator: String) -> Self {
        Self {
            id,
            file_name,
            content: String::new(),
            allowed_users: vec![creator.clone()],
            creator,
            version_history: Vec::new(),
        }
    }

    /// Decodes a stored value, `null` means the record does not exist
    pub fn from_value(
        id: &str,
        value: Value,
    ) -> Result<Option<Document>, serde_json::Error> {
        if value.is_null() {
            return Ok(None);
        }
        let mut doc: Document = serde_json::from_value(value)?;
        doc.id = id.to_string();
        doc.normalize();
        Ok(Some(doc))
    }

    /// Restores `creator ∈ allowed_users` and drops duplicate entries
    pub fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.allowed_users.len());
        self.allowed_users.retain(|user| {
            if seen.contains(user) {
                false
            } else {
                seen.push(user.clone());
                true
            }
        });
        if !self.creator.is_empty() && !self.allowed_users.contains(&self.creator)
        {
            self.allowed_users.insert(0, self.creator.clone());
        }
    }
}

/// Immutable full-content snapshot of a document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Milliseconds since the unix epoch
    pub timestamp: i64,
    #[serde(default)]
    pub content: String,
}

/// Partial write, fields that are `None` are left untouched
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_users: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_history: Option<Vec<Version>>,
}

impl DocumentPatch {
    pub fn content(content: String) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn allowed_users(users: Vec<String>) -> Self {
        Self {
            allowed_users: Some(users),
            ..Default::default()
        }
    }

    pub fn version_history(history: Vec<Version>) -> Self {
        Self {
            version_history: Some(history),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.allowed_users.is_none()
            && self.version_history.is_none()
    }

    pub fn apply(self, doc: &mut Document) {
        if let Some(content) = self.content {
            doc.content = content;
        }
        if let Some(users) = self.allowed_users {
            doc.allowed_users = users;
        }
        if let Some(history) = self.version_history {
            doc.version_history = history;
        }
        doc.normalize();
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SequenceRepr<T> {
    Seq(Vec<Option<T>>),
    Map(HashMap<String, T>),
}

// The realtime store turns sparse arrays into objects keyed by index
// and drops empty ones entirely.
fn sequence_or_map<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let repr = Option::<SequenceRepr<T>>::deserialize(deserializer)?;
    let items = match repr {
        None => Vec::new(),
        Some(SequenceRepr::Seq(items)) => items.into_iter().flatten().collect(),
        Some(SequenceRepr::Map(entries)) => {
            let mut indexed: Vec<(usize, T)> = entries
                .into_iter()
                .filter_map(|(key, item)| key.parse().ok().map(|i| (i, item)))
                .collect();
            indexed.sort_by_key(|(i, _)| *i);
            indexed.into_iter().map(|(_, item)| item).collect()
        }
    };
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_record_with_missing_fields() {
        let doc = Document::from_value(
            "abc",
            json!({"fileName": "notes", "creator": "a@x"}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(doc.id, "abc");
        assert_eq!(doc.content, "");
        assert_eq!(doc.allowed_users, vec!["a@x".to_string()]);
        assert!(doc.version_history.is_empty());
    }

    #[test]
    fn null_is_absent() {
        assert_eq!(Document::from_value("abc", Value::Null).unwrap(), None);
    }

    #[test]
    fn decodes_index_keyed_history() {
        let doc = Document::from_value(
            "abc",
            json!({
                "creator": "a@x",
                "versionHistory": {
                    "10": {"timestamp": 1, "content": "old"},
                    "2": {"timestamp": 5, "content": "new"}
                }
            }),
        )
        .unwrap()
        .unwrap();
        let contents: Vec<&str> = doc
            .version_history
            .iter()
            .map(|v| v.content.as_str())
            .collect();
        assert_eq!(contents, vec!["new", "old"]);
    }

    #[test]
    fn serializes_without_id() {
        let doc = Document::new("abc".into(), "notes".into(), "a@x".into());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            json!({
                "fileName": "notes",
                "content": "",
                "creator": "a@x",
                "allowedUsers": ["a@x"],
                "versionHistory": []
            })
        );
    }

    #[test]
    fn patch_only_serializes_present_fields() {
        let patch = DocumentPatch::content("hello".into());
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"content": "hello"})
        );
    }

    #[test]
    fn patch_keeps_creator_allowed() {
        let mut doc = Document::new("abc".into(), "notes".into(), "a@x".into());
        DocumentPatch::allowed_users(vec!["b@x".into(), "b@x".into()])
            .apply(&mut doc);
        assert_eq!(doc.allowed_users, vec!["a@x".to_string(), "b@x".to_string()]);
    }
}

/// a single tag (array of strings)
pub type Tag = Vec<String>;

/// ordered collection of tags, semantically a multimap keyed by the first element
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Tags(pub Vec<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// append a `[key, value, ...]` tag
    pub fn with(mut self, key: &str, values: &[&str]) -> Self {
        let mut tag = Vec::with_capacity(values.len() + 1);
        tag.push(key.to_string());
        tag.extend(values.iter().map(|v| v.to_string()));
        self.0.push(tag);
        self
    }

    /// get the first "d" tag value or empty string
    pub fn get_d(&self) -> String {
        self.find_value("d").unwrap_or_default().to_string()
    }

    /// get the group id named by the first "h" tag
    pub fn get_h(&self) -> Option<&str> {
        self.find_value("h")
    }

    /// find the first tag with the given key that has at least one value
    pub fn find(&self, key: &str) -> Option<&Tag> {
        self.0.iter().find(|tag| tag.len() >= 2 && tag[0] == key)
    }

    /// value (position 1) of the first tag with the given key
    pub fn find_value(&self, key: &str) -> Option<&str> {
        self.find(key).map(|tag| tag[1].as_str())
    }

    /// find all tags with the given key that have at least one value
    pub fn find_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.0
            .iter()
            .filter(move |tag| tag.len() >= 2 && tag[0] == key)
    }

    /// check if there is a tag made only of the given key, like `["public"]`
    pub fn has_flag(&self, key: &str) -> bool {
        self.0.iter().any(|tag| !tag.is_empty() && tag[0] == key)
    }

    /// check if tags contain any of the given values for a tag name
    pub fn contains_any(&self, tag_name: &str, values: &[String]) -> bool {
        self.find_all(tag_name).any(|tag| values.contains(&tag[1]))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Display for Tags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{json}"),
            Err(err) => write!(f, "Tags({err})"),
        }
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(tags: Vec<Tag>) -> Self {
        Self(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multimap_lookups() {
        let tags = Tags::new()
            .with("h", &["group1"])
            .with("p", &["aa", "admin"])
            .with("p", &["bb"])
            .with("public", &[]);

        assert_eq!(tags.get_h(), Some("group1"));
        assert_eq!(tags.get_d(), "");
        assert_eq!(tags.find_all("p").count(), 2);
        assert!(tags.has_flag("public"));
        assert!(!tags.has_flag("private"));
        assert!(tags.contains_any("p", &["bb".to_string()]));
        assert!(!tags.contains_any("h", &["other".to_string()]));
        assert_eq!(tags.to_string(), r#"[["h","group1"],["p","aa","admin"],["p","bb"],["public"]]"#);
    }
}

use crate::{Event, PubKey};
use serde::{Deserialize, Serialize};

/// represents nostr profile metadata from kind 0 events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,

    /// anything else the author put in
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,

    #[serde(skip)]
    pub pubkey: Option<PubKey>,
}

impl Metadata {
    /// deserialize metadata from a kind 0 event's content
    pub fn from_event(event: &Event) -> Result<Self, serde_json::Error> {
        let mut metadata: Self = serde_json::from_str(&event.content)?;
        metadata.pubkey = Some(event.pubkey);
        Ok(metadata)
    }

    /// display name, then name, then a shortened pubkey
    pub fn render_name(&self) -> String {
        let name = [self.display_name.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .find(|n| !n.trim().is_empty());

        match (name, &self.pubkey) {
            (Some(name), _) if name.chars().count() < 21 => name.to_owned(),
            (Some(name), _) => format!("{}…", name.chars().take(20).collect::<String>()),
            (None, Some(pk)) => pk.short(),
            (None, None) => "<no name>".to_string(),
        }
    }
}

/// kind 0 content as found: parsed when it is a JSON object, raw text otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileContent {
    Parsed(Metadata),
    Raw(String),
}

impl ProfileContent {
    pub fn from_event(event: &Event) -> Self {
        match Metadata::from_event(event) {
            Ok(metadata) => ProfileContent::Parsed(metadata),
            Err(_) => ProfileContent::Raw(event.content.clone()),
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            ProfileContent::Parsed(metadata) => Some(metadata),
            ProfileContent::Raw(_) => None,
        }
    }
}

impl std::fmt::Display for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let about = self.about.as_deref().unwrap_or("<no about>");
        write!(f, "Metadata(name: {}, about: {})", self.render_name(), about)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::signed_event;
    use crate::{Kind, SecretKey, Tags};

    fn profile_event(content: &str) -> Event {
        signed_event(
            &SecretKey::generate(),
            Kind::PROFILE_METADATA,
            Tags::new(),
            content,
            1,
        )
    }

    #[test]
    fn test_deserialize_metadata() {
        let event = profile_event(
            r#"{"name":"alice","about":"developer","website":"https://example.com","pronouns":"they/them"}"#,
        );
        let metadata = Metadata::from_event(&event).unwrap();

        assert_eq!(metadata.name, Some("alice".to_string()));
        assert_eq!(metadata.about, Some("developer".to_string()));
        assert_eq!(metadata.website, Some("https://example.com".to_string()));
        assert_eq!(metadata.banner, None);
        assert_eq!(metadata.pubkey, Some(event.pubkey));
        assert_eq!(metadata.extra.get("pronouns").and_then(|v| v.as_str()), Some("they/them"));
        assert_eq!(metadata.render_name(), "alice");
    }

    #[test]
    fn test_invalid_json() {
        let event = profile_event("not json at all");
        assert!(Metadata::from_event(&event).is_err());
        assert_eq!(
            ProfileContent::from_event(&event),
            ProfileContent::Raw("not json at all".to_string())
        );

        // valid JSON but not an object
        assert!(Metadata::from_event(&profile_event("[1,2]")).is_err());
    }

    #[test]
    fn test_render_name() {
        let mut metadata = Metadata {
            display_name: Some("A very long display name indeed".into()),
            name: Some("short".into()),
            ..Default::default()
        };
        assert_eq!(metadata.render_name(), "A very long display …");

        metadata.display_name = Some("  ".into());
        assert_eq!(metadata.render_name(), "short");

        metadata.name = None;
        assert_eq!(metadata.render_name(), "<no name>");

        let pk = SecretKey::generate().pubkey();
        let anonymous = Metadata {
            pubkey: Some(pk),
            ..Default::default()
        };
        assert_eq!(anonymous.render_name(), pk.short());
    }
}

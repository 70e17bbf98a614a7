//! Template source specifiers.

use std::fmt;

/// Literal prefix selecting lookup by uuid. Matched case-sensitively.
pub const UUID_PREFIX: &str = "uuid://";

/// Where the template for a new instance comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpecifier {
    /// `uuid://<id>`: exact lookup by uuid.
    Uuid(String),
    /// Bare name: lookup by name label, which must be unique.
    NameLabel(String),
    /// No template; a later step imports the instance instead.
    None,
}

impl SourceSpecifier {
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            SourceSpecifier::None
        } else if let Some(uuid) = raw.strip_prefix(UUID_PREFIX) {
            SourceSpecifier::Uuid(uuid.to_string())
        } else {
            SourceSpecifier::NameLabel(raw.to_string())
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SourceSpecifier::None)
    }
}

impl fmt::Display for SourceSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpecifier::Uuid(uuid) => write!(f, "{}{}", UUID_PREFIX, uuid),
            SourceSpecifier::NameLabel(name) => f.write_str(name),
            SourceSpecifier::None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(SourceSpecifier::parse(""), SourceSpecifier::None);
        assert_eq!(
            SourceSpecifier::parse("uuid://abc-123"),
            SourceSpecifier::Uuid("abc-123".into())
        );
        assert_eq!(
            SourceSpecifier::parse("golden-image"),
            SourceSpecifier::NameLabel("golden-image".into())
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive_and_exact() {
        assert_eq!(
            SourceSpecifier::parse("UUID://abc"),
            SourceSpecifier::NameLabel("UUID://abc".into())
        );
        assert_eq!(
            SourceSpecifier::parse("uuid:/abc"),
            SourceSpecifier::NameLabel("uuid:/abc".into())
        );
        assert_eq!(
            SourceSpecifier::parse(" uuid://abc"),
            SourceSpecifier::NameLabel(" uuid://abc".into())
        );
        // Bare prefix still selects uuid lookup, with an empty id.
        assert_eq!(
            SourceSpecifier::parse("uuid://"),
            SourceSpecifier::Uuid(String::new())
        );
    }

    #[test]
    fn test_display_round_trips_raw_form() {
        for raw in ["", "uuid://abc-123", "golden-image"] {
            assert_eq!(SourceSpecifier::parse(raw).to_string(), raw);
        }
    }
}

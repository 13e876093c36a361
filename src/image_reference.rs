use std::fmt;

/// A parsed `registry/repository[:tag][@digest]` container image pointer.
#[derive(Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    MissingRegistry,
    MissingRepository,
    MissingTagOrDigest,
    InvalidDigest(String),
    InvalidFormat(String),
}

impl std::error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "image reference is empty"),
            ParseError::MissingRegistry => write!(f, "registry is missing"),
            ParseError::MissingRepository => write!(f, "repository is missing"),
            ParseError::MissingTagOrDigest => write!(f, "neither tag nor digest is present"),
            ParseError::InvalidDigest(digest) => write!(f, "invalid digest: {}", digest),
            ParseError::InvalidFormat(image) => write!(f, "invalid image format: {}", image),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if s.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) => {
                // algorithm:hex, e.g. sha256:abc
                match digest.split_once(':') {
                    Some((algorithm, hex)) if !algorithm.is_empty() && !hex.is_empty() => {
                        (name, Some(digest.to_string()))
                    }
                    _ => return Err(ParseError::InvalidDigest(digest.to_string())),
                }
            }
            None => (s, None),
        };

        // A colon after the last slash separates the tag, anything before is a registry port
        let last_slash = name.rfind('/');
        let (without_tag, tag) = match name.rfind(':') {
            Some(pos) if last_slash.is_none_or(|slash| pos > slash) => {
                (&name[..pos], Some(name[pos + 1..].to_string()))
            }
            _ => (name, None),
        };

        if tag.as_deref() == Some("") {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }
        if tag.is_none() && digest.is_none() {
            return Err(ParseError::MissingTagOrDigest);
        }

        let (registry, repository) = without_tag
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidFormat(s.to_string()))?;

        if registry.is_empty() {
            return Err(ParseError::MissingRegistry);
        }
        if repository.is_empty() {
            return Err(ParseError::MissingRepository);
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_digest_reference() {
        let reference = ImageReference::parse("registry.example/rag@sha256:aaa").unwrap();
        assert_eq!(reference.registry, "registry.example");
        assert_eq!(reference.repository, "rag");
        assert_eq!(reference.tag, None);
        assert_eq!(reference.digest.as_deref(), Some("sha256:aaa"));
    }

    #[test]
    fn test_parse_tag_reference_with_registry_port() {
        let reference =
            ImageReference::parse("image-registry.openshift-image-registry.svc:5000/rag-content/rag:latest")
                .unwrap();
        assert_eq!(
            reference.registry,
            "image-registry.openshift-image-registry.svc:5000"
        );
        assert_eq!(reference.repository, "rag-content/rag");
        assert_eq!(reference.tag.as_deref(), Some("latest"));
        assert_eq!(reference.digest, None);
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let input = "quay.io/openshift-lightspeed/rag:v1@sha256:0123abcd";
        let reference = ImageReference::parse(input).unwrap();
        assert_eq!(reference.tag.as_deref(), Some("v1"));
        assert_eq!(reference.digest.as_deref(), Some("sha256:0123abcd"));
        assert_eq!(reference.to_string(), input);
    }

    #[test]
    fn test_parse_rejects_malformed_references() {
        assert_eq!(ImageReference::parse(""), Err(ParseError::Empty));
        assert_eq!(
            ImageReference::parse("registry.example/rag"),
            Err(ParseError::MissingTagOrDigest)
        );
        assert_eq!(
            ImageReference::parse("registry.example/rag@sha256"),
            Err(ParseError::InvalidDigest("sha256".to_string()))
        );
        assert_eq!(
            ImageReference::parse("/rag:latest"),
            Err(ParseError::MissingRegistry)
        );
        assert_eq!(
            ImageReference::parse("registry.example/:latest"),
            Err(ParseError::MissingRepository)
        );
        assert!(matches!(
            ImageReference::parse("rag:latest"),
            Err(ParseError::InvalidFormat(_))
        ));
    }
}

use serde::{Deserialize, Serialize};

/// A discovered unit of work: something a downstream job can fetch and scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Provider-specific coordinate (clone URL, image reference, ...).
    pub identifier: String,
    /// Empty means "latest at download time".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_downloader: Option<String>,
}

impl Target {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: None,
            default_downloader: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.version = if version.is_empty() { None } else { Some(version) };
        self
    }

    pub fn with_downloader(mut self, downloader: impl Into<String>) -> Self {
        self.default_downloader = Some(downloader.into());
        self
    }

    /// Replaces the downloader when a run-level override is configured.
    pub fn apply_downloader_override(&mut self, override_downloader: Option<&str>) {
        if let Some(d) = override_downloader {
            self.default_downloader = Some(d.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_version_is_latest() {
        let t = Target::new("docker.io/acme/api").with_version("");
        assert_eq!(t.version, None);
    }

    #[test]
    fn override_replaces_default_downloader() {
        let mut t = Target::new("https://github.com/acme/a.git").with_downloader("git");
        t.apply_downloader_override(None);
        assert_eq!(t.default_downloader.as_deref(), Some("git"));
        t.apply_downloader_override(Some("custom"));
        assert_eq!(t.default_downloader.as_deref(), Some("custom"));
    }
}

//! # Mirror Resolution
//!
//! An ordered set of mirror URLs and the pure mapping from a plugin
//! reference to its candidate download URLs. Mirrors are always tried in
//! the configured order; there is no health scoring or reordering.

use std::fmt;

use crate::store::PLUGIN_EXT;

/// A requested plugin version. `latest` is a first-class sentinel that maps
/// to the mirrors' `latest/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginVersion {
    Latest,
    Pinned(String),
}

impl PluginVersion {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("latest") {
            Self::Latest
        } else {
            Self::Pinned(s.to_string())
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Pinned(v) => f.write_str(v),
        }
    }
}

/// A single requested plugin, identified by `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRef {
    pub name: String,
    pub version: PluginVersion,
}

impl PluginRef {
    pub fn new(name: impl Into<String>, version: PluginVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, PluginVersion::Latest)
    }
}

impl fmt::Display for PluginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// An ordered list of mirror base URLs.
#[derive(Debug, Clone)]
pub struct MirrorSet {
    bases: Vec<String>,
}

impl MirrorSet {
    /// Build a mirror set from base URLs; trailing slashes are normalized
    /// away so resolution can join with a single separator.
    pub fn new(bases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            bases: bases
                .into_iter()
                .map(|b| b.into().trim_end_matches('/').to_string())
                .collect(),
        }
    }

    /// The public Jenkins plugin mirrors, in priority order.
    pub fn jenkins_plugins() -> Self {
        Self::new([
            "https://updates.jenkins.io/download/plugins",
            "https://mirrors.jenkins.io/plugins",
            "https://ftp-chi.osuosl.org/pub/jenkins/plugins",
        ])
    }

    /// The public Jenkins update-center catalog URLs, in priority order.
    pub fn jenkins_update_centers() -> Self {
        Self::new([
            "https://updates.jenkins.io/update-center.json",
            "https://updates.jenkins.io/current/update-center.json",
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// The raw URL list, used for catalog fetches where no templating
    /// applies.
    pub fn urls(&self) -> &[String] {
        &self.bases
    }

    /// Candidate download URLs for a plugin, one per mirror, in mirror
    /// order: `{base}/{name}/{version}/{name}.hpi`.
    pub fn resolve(&self, plugin: &PluginRef) -> Vec<String> {
        self.bases
            .iter()
            .map(|base| {
                format!(
                    "{base}/{name}/{version}/{name}.{PLUGIN_EXT}",
                    name = plugin.name,
                    version = plugin.version,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_pinned_version() {
        let mirrors = MirrorSet::new(["https://a.example/plugins", "https://b.example/plugins/"]);
        let urls = mirrors.resolve(&PluginRef::new(
            "git",
            PluginVersion::Pinned("5.2.1".into()),
        ));
        assert_eq!(
            urls,
            vec![
                "https://a.example/plugins/git/5.2.1/git.hpi",
                "https://b.example/plugins/git/5.2.1/git.hpi",
            ]
        );
    }

    #[test]
    fn resolve_latest_sentinel() {
        let mirrors = MirrorSet::new(["https://a.example/plugins"]);
        let urls = mirrors.resolve(&PluginRef::latest("workflow-api"));
        assert_eq!(
            urls,
            vec!["https://a.example/plugins/workflow-api/latest/workflow-api.hpi"]
        );
    }

    #[test]
    fn version_parsing() {
        assert_eq!(PluginVersion::parse("latest"), PluginVersion::Latest);
        assert_eq!(PluginVersion::parse("LATEST"), PluginVersion::Latest);
        assert_eq!(
            PluginVersion::parse("2.0.3"),
            PluginVersion::Pinned("2.0.3".into())
        );
    }

    #[test]
    fn default_sets_are_populated() {
        assert!(!MirrorSet::jenkins_plugins().is_empty());
        assert_eq!(MirrorSet::jenkins_update_centers().len(), 2);
    }
}

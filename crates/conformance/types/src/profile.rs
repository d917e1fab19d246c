//! Conformance profiles.
//!
//! A profile is a certification tier: a set of core features an
//! implementation must support and a set of extended features that are
//! scored but not required.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::feature::Feature;

/// Name of a built-in conformance profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProfileName {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "TLS")]
    Tls,
    #[serde(rename = "MESH")]
    Mesh,
}

impl ProfileName {
    pub const ALL: &'static [ProfileName] =
        &[ProfileName::Http, ProfileName::Tls, ProfileName::Mesh];

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileName::Http => "HTTP",
            ProfileName::Tls => "TLS",
            ProfileName::Mesh => "MESH",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownProfile(s.to_string()))
    }
}

/// A profile definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: ProfileName,
    pub core: BTreeSet<Feature>,
    pub extended: BTreeSet<Feature>,
    /// How many core features the implementation must declare before the
    /// profile can be scored at all.
    pub min_core_features: usize,
}

impl Profile {
    /// Create a profile whose threshold is "every core feature".
    pub fn new(
        name: ProfileName,
        core: impl IntoIterator<Item = Feature>,
        extended: impl IntoIterator<Item = Feature>,
    ) -> Self {
        let core: BTreeSet<Feature> = core.into_iter().collect();
        let min_core_features = core.len();
        Self {
            name,
            core,
            extended: extended.into_iter().collect(),
            min_core_features,
        }
    }

    /// Override the core-feature threshold.
    pub fn with_min_core_features(mut self, min: usize) -> Self {
        self.min_core_features = min.min(self.core.len());
        self
    }

    /// Whether `feature` is core or extended for this profile.
    pub fn covers(&self, feature: Feature) -> bool {
        self.core.contains(&feature) || self.extended.contains(&feature)
    }

    /// A test belongs to the profile when at least one of its required
    /// features is covered by it. Feature-less tests belong to no profile.
    pub fn includes_test(&self, features: &[Feature]) -> bool {
        features.iter().any(|f| self.covers(*f))
    }

    /// A core test requires only core features.
    pub fn is_core_test(&self, features: &[Feature]) -> bool {
        !features.is_empty() && features.iter().all(|f| self.core.contains(f))
    }
}

/// Catalog of profiles available to a run.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<Profile>,
}

impl ProfileRegistry {
    pub fn new(profiles: Vec<Profile>) -> Self {
        let mut profiles = profiles;
        profiles.sort_by_key(|p| p.name);
        profiles.dedup_by_key(|p| p.name);
        Self { profiles }
    }

    /// The built-in HTTP, TLS and MESH profiles.
    pub fn builtin() -> Self {
        let http_extended = [
            Feature::GatewayPort8080,
            Feature::GatewayStaticAddresses,
            Feature::HttpRouteQueryParamMatching,
            Feature::HttpRouteMethodMatching,
            Feature::HttpRouteResponseHeaderModification,
            Feature::HttpRoutePortRedirect,
            Feature::HttpRouteSchemeRedirect,
            Feature::HttpRoutePathRedirect,
            Feature::HttpRouteHostRewrite,
            Feature::HttpRoutePathRewrite,
            Feature::HttpRouteRequestMirror,
            Feature::HttpRouteRequestMultipleMirrors,
            Feature::HttpRouteRequestTimeout,
            Feature::HttpRouteBackendTimeout,
            Feature::HttpRouteParentRefPort,
        ];

        let mesh_extended = [
            Feature::HttpRoute,
            Feature::HttpRouteQueryParamMatching,
            Feature::HttpRouteMethodMatching,
            Feature::HttpRouteResponseHeaderModification,
            Feature::HttpRoutePortRedirect,
            Feature::HttpRouteSchemeRedirect,
            Feature::HttpRoutePathRedirect,
            Feature::HttpRouteHostRewrite,
            Feature::HttpRoutePathRewrite,
        ];

        Self::new(vec![
            Profile::new(
                ProfileName::Http,
                [Feature::Gateway, Feature::ReferenceGrant, Feature::HttpRoute],
                http_extended,
            ),
            Profile::new(
                ProfileName::Tls,
                [Feature::Gateway, Feature::ReferenceGrant, Feature::TlsRoute],
                [Feature::GatewayPort8080],
            ),
            Profile::new(ProfileName::Mesh, [Feature::Mesh], mesh_extended),
        ])
    }

    pub fn get(&self, name: ProfileName) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    /// Parse user-supplied profile names into a set. Blank entries are ignored.
    pub fn parse_requested<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<BTreeSet<ProfileName>, ConfigError> {
        let mut requested = BTreeSet::new();
        for raw in names {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let name: ProfileName = raw.parse()?;
            if self.get(name).is_none() {
                return Err(ConfigError::UnknownProfile(raw.to_string()));
            }
            requested.insert(name);
        }
        Ok(requested)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

//! Feature registry.
//!
//! Features are the optional capabilities of an implementation that individual
//! conformance tests may require. The set is closed: identifiers are validated
//! once when user input is parsed, and every later stage works with
//! [`Feature`] values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Release channel a feature is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Stable API surface.
    Standard,
    /// Experimental API surface. Includes everything in `Standard`.
    Experimental,
}

impl Channel {
    /// Whether a feature published in `other` is visible from this channel.
    pub fn includes(self, other: Channel) -> bool {
        other <= self
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Standard => write!(f, "standard"),
            Channel::Experimental => write!(f, "experimental"),
        }
    }
}

impl FromStr for Channel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Channel::Standard),
            "experimental" => Ok(Channel::Experimental),
            other => Err(ConfigError::InvalidOption {
                option: "channel".into(),
                reason: format!("expected standard or experimental, got {:?}", other),
            }),
        }
    }
}

macro_rules! features {
    ($( $(#[$doc:meta])* $variant:ident => $id:literal, $channel:ident; )+) => {
        /// A named capability of the implementation under test.
        ///
        /// Variant order is registry order; `Ord` follows it so that sets of
        /// features iterate deterministically.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub enum Feature {
            $( $(#[$doc])* $variant, )+
        }

        impl Feature {
            /// Every feature, in registry order.
            pub const ALL: &'static [Feature] = &[ $( Feature::$variant, )+ ];

            /// The canonical identifier used on the command line and in reports.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Feature::$variant => $id, )+
                }
            }

            /// Channel the feature is published in.
            pub fn channel(self) -> Channel {
                match self {
                    $( Feature::$variant => Channel::$channel, )+
                }
            }
        }
    };
}

features! {
    /// Gateway resources and listener basics.
    Gateway => "Gateway", Standard;
    /// Gateway listeners on port 8080.
    GatewayPort8080 => "GatewayPort8080", Standard;
    /// Gateways requesting static addresses.
    GatewayStaticAddresses => "GatewayStaticAddresses", Experimental;
    /// Cross-namespace references permitted through ReferenceGrant.
    ReferenceGrant => "ReferenceGrant", Standard;
    /// HTTPRoute core matching and forwarding.
    HttpRoute => "HTTPRoute", Standard;
    HttpRouteQueryParamMatching => "HTTPRouteQueryParamMatching", Standard;
    HttpRouteMethodMatching => "HTTPRouteMethodMatching", Standard;
    HttpRouteResponseHeaderModification => "HTTPRouteResponseHeaderModification", Standard;
    HttpRoutePortRedirect => "HTTPRoutePortRedirect", Standard;
    HttpRouteSchemeRedirect => "HTTPRouteSchemeRedirect", Standard;
    HttpRoutePathRedirect => "HTTPRoutePathRedirect", Standard;
    HttpRouteHostRewrite => "HTTPRouteHostRewrite", Standard;
    HttpRoutePathRewrite => "HTTPRoutePathRewrite", Standard;
    HttpRouteRequestMirror => "HTTPRouteRequestMirror", Standard;
    HttpRouteRequestMultipleMirrors => "HTTPRouteRequestMultipleMirrors", Experimental;
    HttpRouteRequestTimeout => "HTTPRouteRequestTimeout", Experimental;
    HttpRouteBackendTimeout => "HTTPRouteBackendTimeout", Experimental;
    HttpRouteParentRefPort => "HTTPRouteParentRefPort", Experimental;
    /// TLS passthrough routing.
    TlsRoute => "TLSRoute", Experimental;
    /// GRPC routing.
    GrpcRoute => "GRPCRoute", Experimental;
    /// East-west (service mesh) routing.
    Mesh => "Mesh", Experimental;
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownFeature(s.to_string()))
    }
}

impl From<Feature> for String {
    fn from(feature: Feature) -> Self {
        feature.as_str().to_string()
    }
}

impl TryFrom<String> for Feature {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Metadata for one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub feature: Feature,
    pub channel: Channel,
}

/// Catalog of the features known to this build.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    entries: Vec<FeatureInfo>,
}

impl FeatureRegistry {
    /// Registry holding every built-in feature.
    pub fn builtin() -> Self {
        Self::from_features(Feature::ALL.iter().copied())
    }

    /// Registry restricted to the given features.
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut entries: Vec<FeatureInfo> = features
            .into_iter()
            .map(|feature| FeatureInfo {
                feature,
                channel: feature.channel(),
            })
            .collect();
        entries.sort_by_key(|info| info.feature);
        entries.dedup_by_key(|info| info.feature);
        Self { entries }
    }

    /// Look up a feature by its identifier.
    pub fn lookup(&self, id: &str) -> Option<Feature> {
        self.entries
            .iter()
            .find(|info| info.feature.as_str() == id)
            .map(|info| info.feature)
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.entries.iter().any(|info| info.feature == feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureInfo> {
        self.entries.iter()
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.entries.iter().map(|info| info.feature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_round_trip() {
        for feature in Feature::ALL {
            let parsed: Feature = feature.as_str().parse().unwrap();
            assert_eq!(parsed, *feature);
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("httproute".parse::<Feature>().is_err());
        assert_eq!("HTTPRoute".parse::<Feature>().unwrap(), Feature::HttpRoute);
    }

    #[test]
    fn test_builtin_registry_has_every_feature() {
        let registry = FeatureRegistry::builtin();
        assert_eq!(registry.len(), Feature::ALL.len());
        assert_eq!(registry.lookup("Mesh"), Some(Feature::Mesh));
        assert_eq!(registry.lookup("Nope"), None);
    }

    #[test]
    fn test_serializes_as_identifier() {
        let json = serde_json::to_string(&Feature::HttpRouteQueryParamMatching).unwrap();
        assert_eq!(json, "\"HTTPRouteQueryParamMatching\"");
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Feature::HttpRouteQueryParamMatching);
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!("Standard".parse::<Channel>().unwrap(), Channel::Standard);
        assert!("beta".parse::<Channel>().is_err());
        assert!(Channel::Experimental.includes(Channel::Standard));
        assert!(!Channel::Standard.includes(Channel::Experimental));
    }
}

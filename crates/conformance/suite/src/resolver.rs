//! Capability resolution.
//!
//! Turns the user's supported/exempt lists and the enable-all switch into the
//! run's [`SupportedFeatureSet`]. Every identifier is validated here, once.

use conformance_types::{Channel, ConfigError, ConfigResult, Feature, FeatureRegistry};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Features the implementation claims to support for this run.
///
/// Immutable once resolved. Iterates in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SupportedFeatureSet(BTreeSet<Feature>);

impl SupportedFeatureSet {
    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    /// Required features that are not in the set, in the order given.
    pub fn missing(&self, required: &[Feature]) -> Vec<Feature> {
        required
            .iter()
            .copied()
            .filter(|f| !self.contains(*f))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Feature> for SupportedFeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for SupportedFeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|feature| feature.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

fn lookup_all<S: AsRef<str>>(
    ids: &[S],
    registry: &FeatureRegistry,
) -> ConfigResult<BTreeSet<Feature>> {
    ids.iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .map(|id| {
            registry
                .lookup(id)
                .ok_or_else(|| ConfigError::UnknownFeature(id.to_string()))
        })
        .collect()
}

/// Compute the supported feature set.
///
/// With `enable_all`, every registry feature visible from `channel` minus the
/// exempt ones is supported. Otherwise the explicit list minus the exempt
/// list; `channel` does not restrict explicitly listed features. Exemption
/// always wins. Any identifier missing from `registry` is an error.
pub fn resolve<S: AsRef<str>>(
    explicit_supported: &[S],
    explicit_exempt: &[S],
    enable_all: bool,
    channel: Channel,
    registry: &FeatureRegistry,
) -> ConfigResult<SupportedFeatureSet> {
    let supported = lookup_all(explicit_supported, registry)?;
    let exempt = lookup_all(explicit_exempt, registry)?;

    let base: BTreeSet<Feature> = if enable_all {
        registry
            .features()
            .filter(|feature| channel.includes(feature.channel()))
            .collect()
    } else {
        supported
    };

    Ok(base.difference(&exempt).copied().collect())
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    /// Rank used when resolving a tier's feature set. Premium and enterprise
    /// share a rank, so both resolve to the same feature list.
    fn feature_rank(&self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Premium | Tier::Enterprise => 1,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Free => write!(f, "free"),
            Tier::Premium => write!(f, "premium"),
            Tier::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureDescriptor {
    pub id: &'static str,
    pub required_tier: Tier,
    /// Each invocation draws one unit from the shared monthly AI quota.
    pub is_metered: bool,
}

const fn feature(id: &'static str, required_tier: Tier, is_metered: bool) -> FeatureDescriptor {
    FeatureDescriptor {
        id,
        required_tier,
        is_metered,
    }
}

pub const FEATURES: &[FeatureDescriptor] = &[
    feature("dashboard", Tier::Free, false),
    feature("student_management", Tier::Free, false),
    feature("attendance_tracking", Tier::Free, false),
    feature("parent_messaging", Tier::Free, false),
    feature("basic_reports", Tier::Free, false),
    feature("ai_lesson_generator", Tier::Free, true),
    feature("homework_grader", Tier::Premium, true),
    feature("stem_activities", Tier::Premium, true),
    feature("progress_analysis", Tier::Premium, true),
    feature("ai_insights", Tier::Premium, true),
    feature("advanced_analytics", Tier::Premium, false),
    feature("payment_tracking", Tier::Premium, false),
    feature("bulk_messaging", Tier::Premium, false),
    feature("custom_reports", Tier::Premium, false),
    feature("priority_support", Tier::Premium, false),
    feature("multi_school_management", Tier::Enterprise, false),
    feature("sso_integration", Tier::Enterprise, false),
];

pub static CATALOG: Catalog = Catalog::new(FEATURES);

/// Fixed table of features. Ids absent from the table are open to every
/// tier and never metered.
#[derive(Debug)]
pub struct Catalog {
    features: &'static [FeatureDescriptor],
}

impl Catalog {
    pub const fn new(features: &'static [FeatureDescriptor]) -> Self {
        Self { features }
    }

    pub fn get(&self, feature_id: &str) -> Option<&FeatureDescriptor> {
        self.features.iter().find(|f| f.id == feature_id)
    }

    pub fn contains(&self, feature_id: &str) -> bool {
        self.get(feature_id).is_some()
    }

    pub fn required_tier(&self, feature_id: &str) -> Option<Tier> {
        self.get(feature_id).map(|f| f.required_tier)
    }

    pub fn is_metered(&self, feature_id: &str) -> bool {
        self.get(feature_id).is_some_and(|f| f.is_metered)
    }

    /// Whether `feature_id` belongs to the resolved feature set of `tier`.
    pub fn grants(&self, tier: Tier, feature_id: &str) -> bool {
        let required = self.required_tier(feature_id).unwrap_or(Tier::Free);
        required.feature_rank() <= tier.feature_rank()
    }

    pub fn features_for(&self, tier: Tier) -> Vec<&'static str> {
        self.features
            .iter()
            .filter(|f| f.required_tier.feature_rank() <= tier.feature_rank())
            .map(|f| f.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureDescriptor> {
        self.features.iter()
    }
}

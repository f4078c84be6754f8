use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ResourceRequirements;

/// Per-resource ceilings checked at submission.
///
/// This is a declared-demand comparison; nothing measures real CPU, memory
/// or I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    limits: BTreeMap<String, f64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::unlimited()
            .with_limit("cpu", 80.0)
            .with_limit("memory", 70.0)
            .with_limit("io", 60.0)
    }
}

/// A requirement that does not fit under its ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceShortfall {
    pub resource: String,
    pub requested: f64,
    pub limit: f64,
}

impl ResourceLimits {
    /// No ceilings at all.
    pub fn unlimited() -> Self {
        Self {
            limits: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, resource: impl Into<String>, limit: f64) -> Self {
        self.limits.insert(resource.into(), limit);
        self
    }

    pub fn limit(&self, resource: &str) -> Option<f64> {
        self.limits.get(resource).copied()
    }

    /// First requirement over its ceiling, in resource-name order.
    /// Resources without a ceiling always pass.
    pub fn check(&self, requirements: &ResourceRequirements) -> Result<(), ResourceShortfall> {
        for (resource, &requested) in requirements {
            let Some(limit) = self.limit(resource) else {
                continue;
            };
            if requested.is_nan() || requested > limit {
                return Err(ResourceShortfall {
                    resource: resource.clone(),
                    requested,
                    limit,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn demand(pairs: &[(&str, f64)]) -> ResourceRequirements {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[rstest]
    #[case::empty(&[], true)]
    #[case::at_limit(&[("cpu", 80.0)], true)]
    #[case::over_cpu(&[("cpu", 90.0)], false)]
    #[case::over_io(&[("memory", 10.0), ("io", 60.5)], false)]
    #[case::unknown_resource(&[("gpu", 1000.0)], true)]
    #[case::nan(&[("memory", f64::NAN)], false)]
    fn default_limits(#[case] pairs: &[(&str, f64)], #[case] fits: bool) {
        assert_eq!(ResourceLimits::default().check(&demand(pairs)).is_ok(), fits);
    }

    #[test]
    fn shortfall_reports_resource_and_limit() {
        let err = ResourceLimits::default()
            .check(&demand(&[("cpu", 95.0)]))
            .unwrap_err();
        assert_eq!(
            err,
            ResourceShortfall {
                resource: "cpu".into(),
                requested: 95.0,
                limit: 80.0
            }
        );
    }

    #[test]
    fn unlimited_accepts_everything() {
        assert!(ResourceLimits::unlimited()
            .check(&demand(&[("cpu", 1e9)]))
            .is_ok());
    }
}

//! Resource descriptors: how much compute a runner asks for, and how much a
//! method needs at minimum.

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Result, RobataError};

/// # Resource
///
/// Requested compute: a CPU share and a number of accelerators. Both amounts
/// may be fractional. A resource is read-only once a runner is initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default, alias = "nvidia_gpu")]
    pub accelerator_count: f64,
}

impl Resource {
    /// Creates a validated resource descriptor.
    pub fn new(cpu: f64, accelerator_count: f64) -> Result<Self> {
        let resource = Self { cpu, accelerator_count };
        resource.validate()?;
        Ok(resource)
    }

    /// A CPU-only descriptor
    pub fn cpu(cpu: f64) -> Result<Self> {
        Self::new(cpu, 0.0)
    }

    pub fn with_accelerators(mut self, count: f64) -> Result<Self> {
        self.accelerator_count = count;
        self.validate()?;
        Ok(self)
    }

    /// Rejects negative and non-finite amounts.
    pub fn validate(&self) -> Result<()> {
        for (name, amount) in [("cpu", self.cpu), ("accelerator_count", self.accelerator_count)] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(RobataError::InvalidResource(format!(
                    "{name} must be a finite, non-negative amount, got {amount}"
                )));
            }
        }
        Ok(())
    }

    /// True if every amount in `required` is covered by `self`.
    pub fn satisfies(&self, required: &Resource) -> bool {
        self.cpu >= required.cpu && self.accelerator_count >= required.accelerator_count
    }

    /// Fails with [`RobataError::ResourceUnavailable`] unless `self` covers `required`.
    pub fn ensure_satisfies(&self, required: &Resource, what: &str) -> Result<()> {
        if self.satisfies(required) {
            Ok(())
        } else {
            Err(RobataError::ResourceUnavailable(format!(
                "{what} requires {required}, runner was given {self}"
            )))
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu={} accelerators={}", self.cpu, self.accelerator_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_amounts() {
        assert!(matches!(Resource::new(-1.0, 0.0), Err(RobataError::InvalidResource(_))));
        assert!(matches!(Resource::new(1.0, f64::NAN), Err(RobataError::InvalidResource(_))));
        assert!(matches!(Resource::cpu(f64::INFINITY), Err(RobataError::InvalidResource(_))));
        assert!(Resource::new(0.5, 2.0).is_ok());
    }

    #[test]
    fn test_satisfies() {
        let gpu = Resource::new(1.0, 1.0).unwrap();
        let cpu = Resource::cpu(4.0).unwrap();
        let needs_gpu = Resource::new(0.0, 1.0).unwrap();

        assert!(gpu.satisfies(&needs_gpu));
        assert!(!cpu.satisfies(&needs_gpu));
        assert!(cpu.satisfies(&Resource::default()));
        assert!(matches!(
            cpu.ensure_satisfies(&needs_gpu, "method `embed`"),
            Err(RobataError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_deserialize_accepts_gpu_alias() {
        let resource: Resource = serde_json::from_str(r#"{"cpu": 2, "nvidia_gpu": 1}"#).unwrap();
        assert_eq!(resource, Resource::new(2.0, 1.0).unwrap());

        let empty: Resource = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, Resource::default());
    }
}

//! Hosting plans.
//!
//! A plan bounds how much memory an instance may request and how many backups
//! it keeps. `BYOS` ("bring your own server") is the unrestricted tier: its RAM
//! and retention cap come from the instance descriptor instead of the plan.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Plan tier of an instance.
///
/// Persisted by display name; names are parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PlanTier {
    Byos,
    Basic,
    Intermediate,
    Advanced,
    Pro,
    Elite,
}

impl PlanTier {
    /// Every tier, cheapest first.
    pub const ALL: [PlanTier; 6] = [
        PlanTier::Byos,
        PlanTier::Basic,
        PlanTier::Intermediate,
        PlanTier::Advanced,
        PlanTier::Pro,
        PlanTier::Elite,
    ];

    /// Display name as persisted in descriptors.
    pub fn name(self) -> &'static str {
        match self {
            PlanTier::Byos => "BYOS",
            PlanTier::Basic => "Basic",
            PlanTier::Intermediate => "Intermediate",
            PlanTier::Advanced => "Advanced",
            PlanTier::Pro => "PRO",
            PlanTier::Elite => "Elite",
        }
    }

    /// Heap ceiling in gigabytes granted by the plan.
    pub fn ram_gb(self) -> u32 {
        match self {
            PlanTier::Byos | PlanTier::Basic => 4,
            PlanTier::Intermediate => 6,
            PlanTier::Advanced => 8,
            PlanTier::Pro => 10,
            PlanTier::Elite => 16,
        }
    }

    /// Retention cap fixed by the plan, `None` when the descriptor decides.
    pub fn max_backups(self) -> Option<usize> {
        match self {
            PlanTier::Byos => None,
            PlanTier::Basic => Some(5),
            PlanTier::Intermediate => Some(10),
            PlanTier::Advanced => Some(15),
            PlanTier::Pro => Some(20),
            PlanTier::Elite => Some(25),
        }
    }

    /// Whether the owner may pick their own RAM limit.
    pub fn is_unrestricted(self) -> bool {
        self == PlanTier::Byos
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlanTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byos" => Ok(PlanTier::Byos),
            "basic" => Ok(PlanTier::Basic),
            "intermediate" | "intermidate" => Ok(PlanTier::Intermediate),
            "advanced" => Ok(PlanTier::Advanced),
            "pro" => Ok(PlanTier::Pro),
            "elite" => Ok(PlanTier::Elite),
            _ => Err(Error::UnknownPlan(s.to_string())),
        }
    }
}

impl TryFrom<String> for PlanTier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PlanTier> for String {
    fn from(tier: PlanTier) -> Self {
        tier.name().to_string()
    }
}

/// A plan bound to the owner it was purchased by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub tier: PlanTier,
    pub owner: String,
}

impl Plan {
    pub fn new(tier: PlanTier, owner: impl Into<String>) -> Self {
        Self {
            tier,
            owner: owner.into(),
        }
    }

    /// Parses a plan by tier name.
    pub fn from_name(tier: &str, owner: impl Into<String>) -> Result<Self> {
        Ok(Self::new(tier.parse()?, owner))
    }
}

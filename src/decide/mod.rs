//! Decide rules
//!
//! A decide rule looks at one item and answers ACCEPT, REJECT or PASS (no
//! opinion). Rules gate which outlinks are subject to crawl mapping and
//! whether an unchanged URI continues through processing.

pub mod digest;

pub use digest::{has_identical_digest, IdenticalDigestRule};

use serde::{Deserialize, Serialize};

/// Outcome of a decide rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
    Pass,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Reject => "REJECT",
            Self::Pass => "PASS",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPT" => Ok(Self::Accept),
            "REJECT" => Ok(Self::Reject),
            "PASS" => Ok(Self::Pass),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

/// A rule deciding about items of type `T`
pub trait DecideRule<T: ?Sized>: Send + Sync {
    fn decision_for(&self, item: &T) -> Decision;

    /// Admitted unless explicitly rejected
    fn admits(&self, item: &T) -> bool {
        self.decision_for(item) != Decision::Reject
    }
}

/// Rule returning the same decision for everything
#[derive(Debug, Clone, Copy)]
pub struct ConstantRule(pub Decision);

impl ConstantRule {
    pub fn accept_all() -> Self {
        Self(Decision::Accept)
    }

    pub fn reject_all() -> Self {
        Self(Decision::Reject)
    }
}

impl<T: ?Sized> DecideRule<T> for ConstantRule {
    fn decision_for(&self, _item: &T) -> Decision {
        self.0
    }
}

/// Rule backed by a closure
pub struct FnRule<F>(pub F);

impl<T: ?Sized, F> DecideRule<T> for FnRule<F>
where
    F: Fn(&T) -> Decision + Send + Sync,
{
    fn decision_for(&self, item: &T) -> Decision {
        (self.0)(item)
    }
}

//! Silo identifier type.
//!
//! This module defines the [`Silo`] type, the closed set of business-line
//! partitions that every tenant-owned record belongs to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A business-line partition.
///
/// The set is closed: anything that is not exactly `BF`, `BI` or `SLF`
/// is rejected. Parsing is case-sensitive on the canonical code so that a
/// loosely formatted value coming out of an identity provider fails closed
/// instead of being coerced.
///
/// # Examples
///
/// ```
/// use portal_persistence::silo::Silo;
///
/// let silo: Silo = "BI".parse().unwrap();
/// assert_eq!(silo, Silo::BI);
/// assert_eq!(silo.as_str(), "BI");
/// assert!("bi".parse::<Silo>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Silo {
    /// Business finance.
    BF,
    /// Business insurance.
    BI,
    /// Secured lending facility.
    SLF,
}

impl Silo {
    /// All silos, in declaration order.
    pub const ALL: [Silo; 3] = [Silo::BF, Silo::BI, Silo::SLF];

    /// Returns the canonical code stored in `silo` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Silo::BF => "BF",
            Silo::BI => "BI",
            Silo::SLF => "SLF",
        }
    }

    /// Returns the lowercase form used as a route prefix (`/bi/...`).
    pub fn path_segment(&self) -> &'static str {
        match self {
            Silo::BF => "bf",
            Silo::BI => "bi",
            Silo::SLF => "slf",
        }
    }

    /// Parses a route prefix segment.
    ///
    /// Route prefixes only ever name the silo a route *requires*; they are
    /// never used as the scope of a query.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Silo::ALL
            .into_iter()
            .find(|silo| silo.path_segment() == segment)
    }
}

impl fmt::Display for Silo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known silo code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSilo(pub String);

impl fmt::Display for UnknownSilo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown silo '{}'", self.0)
    }
}

impl std::error::Error for UnknownSilo {}

impl FromStr for Silo {
    type Err = UnknownSilo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BF" => Ok(Silo::BF),
            "BI" => Ok(Silo::BI),
            "SLF" => Ok(Silo::SLF),
            other => Err(UnknownSilo(other.to_string())),
        }
    }
}

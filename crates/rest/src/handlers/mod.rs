//! HTTP request handlers.
//!
//! - [`health`] - Health and liveness probes
//! - [`contacts`] - Contact listing for the caller's silo
//! - [`applications`] - Loan application reads (audited)
//! - [`commissions`] - BI commission reads (role-restricted, audited)

pub mod applications;
pub mod commissions;
pub mod contacts;
pub mod health;

// Re-export handlers for convenience
pub use applications::read_application_handler;
pub use commissions::read_commission_handler;
pub use contacts::list_contacts_handler;
pub use health::{health_handler, liveness_handler};

use portal_persistence::silo::Silo;

use crate::error::{RestError, RestResult};

/// Maps a route prefix to the silo the route requires.
///
/// Only the requirement comes from the path; query scope always comes from
/// the principal.
pub(crate) fn route_silo(segment: &str) -> RestResult<Silo> {
    Silo::from_path_segment(segment).ok_or_else(|| RestError::NotFound {
        entity: "route",
        id: segment.to_string(),
    })
}

//! Pro-rata participation rights offered to existing investors in a new
//! round: sizing, acceptance, exercise, decline, and lazy expiry.

mod book;
mod entitlement;
mod error;

pub use book::EntitlementBook;
pub use entitlement::{
    create_entitlements, EntitlementStatus, ProRataEntitlement, RoundOffer, AMOUNT_SCALE,
};
pub use error::{ProRataError, Result};

//! Round lifecycle and closing: share allocation, anti-dilution adjustment,
//! and the snapshot that records both.

mod anti_dilution;
mod closing;
mod errors;
mod round;

pub use anti_dilution::{
    adjusted_conversion_price, compute_adjustments, AntiDilutionAdjustment, DilutiveIssuance,
    RATIO_SCALE,
};
pub use closing::{
    allocate_shares, close_round, ClosedRound, FinalTerms, RoundClosing, ShareAllocation,
};
pub use errors::{Result, RoundError};
pub use round::{Investment, Round, RoundStatus};

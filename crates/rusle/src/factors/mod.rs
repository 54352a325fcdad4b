//! The five RUSLE factors
//!
//! Each factor is a pure function from input handles and a coefficient
//! struct to a new handle. Nothing here fetches data.

pub mod cover;
pub mod erodibility;
pub mod erosivity;
pub mod practice;
pub mod topography;

#[cfg(test)]
pub(crate) mod testing;

pub use cover::{cover, CoverCoefficients, MAX_COVER};
pub use erodibility::{erodibility, ErodibilityCoefficients, SoilInputs};
pub use erosivity::{erosivity, Erosivity, ErosivityCoefficients, ErosivityParams, Season};
pub use practice::{practice, PracticeCoefficients};
pub use topography::{topography, Topography, TopographyCoefficients};

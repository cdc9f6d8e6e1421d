pub mod availability;
pub mod lifecycle;
pub mod mirror;
pub mod payments;
pub mod pricing;
pub mod scheduling;

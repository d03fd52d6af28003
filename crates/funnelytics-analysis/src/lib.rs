pub mod conversion;
pub mod dropoff;

pub use ab_test::evaluate;
pub use conversion::analyze;
pub use dropoff::analyze_dropoffs;

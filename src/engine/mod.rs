pub mod best_price;
pub mod kelly;
pub mod odds;
pub mod probability;

pub use best_price::{best_price, BestPrice};
pub use kelly::kelly_stake;
pub use odds::{american_to_decimal, decimal_to_american};
pub use probability::{expected_value, implied_probability, remove_vig, ProbabilityResult};

pub mod events;
pub mod market_data;

pub use events::*;
pub use market_data::normalize;

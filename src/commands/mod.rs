pub mod answer_api;
pub mod offer_api;
pub mod util_api;

pub mod recommendation;
pub mod regime;

pub use recommendation::{Recommendation, RecommendationStore};
pub use regime::{RegimeController, RegimeSnapshot};

pub mod db;
pub mod error;
pub mod score;
pub mod types;

pub use db::BotScoreStore;
pub use error::{AnalyticsError, Result};
pub use score::{composite_score, compute, is_stale};
pub use types::{BotScore, Grade, ScoreComponents, SizeCategory};

pub mod alert;
pub mod diff;
pub mod engine;
pub mod error;
pub mod ids;
pub mod message;
pub mod model;
pub mod time;

pub use alert::*;
pub use diff::*;
pub use engine::*;
pub use error::*;
pub use ids::*;
pub use message::*;
pub use model::*;
pub use time::*;

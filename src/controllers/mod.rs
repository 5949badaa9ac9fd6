pub mod health;
pub mod podcast;

pub use podcast::PodcastController;

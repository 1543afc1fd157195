pub mod game_cache;

pub use game_cache::GameCache;

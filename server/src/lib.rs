pub mod analysis;
pub mod api;
pub mod db;
pub mod dna;
pub mod error;
pub mod leaderboard;
pub mod rate_limit;
pub mod types;

pub mod leaderboard;
pub mod performance;
pub mod tournament;

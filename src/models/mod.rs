pub mod matches;
pub mod participation;
pub mod players;
pub mod stadiums;

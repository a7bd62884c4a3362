pub mod journable;
pub mod journal;

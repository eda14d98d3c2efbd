pub mod cli;
pub mod kdamonds;
pub mod report;

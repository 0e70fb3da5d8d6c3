pub mod logger;
pub mod object;

pub mod accounts;
pub mod portfolio;
pub mod quotes;
pub mod trading;

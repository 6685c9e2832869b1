pub mod audit;
pub mod booking;
pub mod clock;
pub mod inventory;
pub mod notification;
pub mod pricing;
pub mod quotes;
pub mod sweeper;

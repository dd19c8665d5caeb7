pub mod health;
pub mod jobs;
pub mod participations;
pub mod rewards;
pub mod uploads;
pub mod wallets;

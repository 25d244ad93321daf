pub mod health;
pub mod sales;
pub mod stock;
pub mod transfers;

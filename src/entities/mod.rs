pub mod location;
pub mod product;
pub mod sale_record;
pub mod stock_batch;

mod client;

pub use client::{ANSWER_SEPARATOR, ClientArgs, ORDER_SEPARATOR, exchange_orders, run_client, split_orders};

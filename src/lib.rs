// src/lib.rs
pub mod config;
pub mod env;
pub mod message;
pub mod messaging;

pub use lapin::message::Delivery;
pub use messaging::{
    DeliveryHandler, ExchangeType, MessagingClient, MessagingClientTrait, MessagingError, Result,
};

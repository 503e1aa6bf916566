// Shipped ticket handlers, one module per provider

pub mod credit_hold;
pub mod price_list;
pub mod users;

//! Business logic, one module per aggregate.

pub mod bookings;
pub mod carts;
pub mod emails;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod products;
pub mod sessions;

pub use bookings::BookingService;
pub use carts::{CartService, PricingConfig};
pub use emails::EmailService;
pub use inventory::InventoryService;
pub use orders::OrderService;
pub use payments::PaymentService;
pub use products::ProductService;
pub use sessions::SessionService;

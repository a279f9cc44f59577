//! Database entities for the Matchable storefront.

pub mod booking;
pub mod booking_session;
pub mod cart_coupon;
pub mod cart_item;
pub mod cart_session;
pub mod category;
pub mod coupon;
pub mod coupon_usage;
pub mod inventory_movement;
pub mod order;
pub mod order_item;
pub mod payment_transaction;
pub mod product;
pub mod product_image;
pub mod product_variant;
pub mod session;
pub mod session_type;
pub mod trainer;

// Re-export entities under their common aliases
pub use booking::{BookingStatus, Entity as Booking, Model as BookingModel};
pub use booking_session::{
    BookingSessionStatus, Entity as BookingSession, Model as BookingSessionModel,
};
pub use cart_coupon::{Entity as CartCoupon, Model as CartCouponModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use cart_session::{Entity as CartSession, Model as CartSessionModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use coupon::{CouponType, Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use inventory_movement::{
    Entity as InventoryMovement, Model as InventoryMovementModel, MovementType,
};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment_transaction::{
    Entity as PaymentTransaction, Model as PaymentTransactionModel, PaymentMethod,
    PaymentTransactionStatus,
};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use session::{Entity as Session, Model as SessionModel, SessionStatus};
pub use session_type::{Entity as SessionType, Model as SessionTypeModel};
pub use trainer::{Entity as Trainer, Model as TrainerModel};

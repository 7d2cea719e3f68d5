pub mod cart_item;
pub mod customer_address;
pub mod order;
pub mod order_item;
pub mod payment_event;
pub mod payment_method;
pub mod product;

pub use cart_item::Entity as CartItem;
pub use customer_address::Entity as CustomerAddress;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment_event::Entity as PaymentEvent;
pub use payment_method::Entity as PaymentMethod;
pub use product::Entity as Product;

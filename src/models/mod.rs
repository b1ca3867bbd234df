pub mod event;
pub mod order;
pub mod product;

// Re-export only the types we actually use
pub use event::FlashSaleEvent;
pub use order::{OrderStatus, PaymentMethod, SalesOrder, SalesOrderItem};
pub use product::{Product, StockLedger};

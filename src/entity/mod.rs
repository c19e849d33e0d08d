pub mod audit_logs;
pub mod bag_entries;
pub mod items;
pub mod order_items;
pub mod orders;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use bag_entries::Entity as BagEntries;
pub use items::Entity as Items;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use users::Entity as Users;

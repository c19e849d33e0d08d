//! Checkout: bag snapshot, pricing, payment capture, order write and bag clear.

pub mod error;
pub mod http_gateway;
pub mod lock;
pub mod orchestrator;
pub mod payment;
pub mod pg_store;
pub mod ports;
pub mod pricing;
pub mod snapshot;

pub use error::CheckoutError;
pub use http_gateway::HttpPaymentGateway;
pub use lock::CheckoutLocks;
pub use orchestrator::{CheckoutOrchestrator, CheckoutSettings, CheckoutStage};
pub use payment::{
    CaptureError, CaptureRequest, ChargeReceipt, IdempotencyKey, PaymentCaptureClient,
    PaymentGateway, RetryPolicy,
};
pub use pg_store::PgCheckoutStore;
pub use ports::{
    BagClearer, BagSnapshotReader, CheckoutJournal, OrderDraft, OrderMaterializer, StoreError,
};
pub use snapshot::{BagSnapshot, ItemFields, SnapshotLine};

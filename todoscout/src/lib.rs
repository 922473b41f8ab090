pub mod config;
pub mod delivery;
pub mod errors;
pub mod export;
pub mod glob;
pub mod metrics;
pub mod results;
pub mod scan;
pub mod walker;

pub use config::{CliOverrides, DeliveryConfig, EncodingMode, ScanConfig};
pub use delivery::{
    deliver_all, Deliverer, DeliveryError, DeliveryReport, NotionDatabase, RetryPolicy,
    SlackWebhook,
};
pub use errors::{ScanError, ScanResult};
pub use export::ExportFormat;
pub use results::{group_by_file, Priority, ScanOutput, TodoItem};
pub use scan::{scan, TodoParser, TodoScanner};

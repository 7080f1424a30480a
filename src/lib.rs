pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use config::UploaderConfig;
pub use error::UploadError;
pub use models::{
    FieldBinding, SelectionMode, SourcePayload, TaskEvent, TaskSnapshot, UploadSource,
    UploadStatus,
};
pub use services::coordinator::UploadCoordinator;
pub use services::form::{FormStateStore, InMemoryFormState};
pub use services::presign::{HttpUrlIssuer, S3UrlIssuer, UrlIssuer};
pub use services::transfer::{HttpTransferSink, ProgressFn, TransferSink};
pub use utils::path::destination_path;

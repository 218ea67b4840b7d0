pub mod clock;
pub mod content;
pub mod error;
pub mod item;
pub mod policy;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{blob_path_for, infer_content_type, validate_file_name};
pub use error::ValidationError;
pub use item::{ConsumeRecord, ConsumeStatus, NewItem, ReclaimCandidate, ShareableItem};
pub use policy::{AccessPolicy, IngestPolicy};
pub use types::ItemId;

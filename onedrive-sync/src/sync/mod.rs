pub mod backup;
pub mod transfer;

pub use backup::{
    BackupError, BackupOptions, BackupOutcome, CopyDecision, SkipReason, backup_file,
    copy_if_same_hash,
};
pub use transfer::{TransferError, download_to_path, upload_from_path};

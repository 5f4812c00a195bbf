mod client;
mod hash;
mod monitor;
mod oauth;
mod path;

pub use client::{
    ApiErrorClass, ConflictBehavior, CopyOutcome, DriveItem, FileFacet, FolderFacet, Hashes,
    ItemReference, OneDriveClient, OneDriveError, ParseConflictBehaviorError, Uploaded,
};
pub use hash::{ContentHasher, hashes_match, sha1_bytes, sha1_file};
pub use monitor::{AsyncOperation, CompletedOperation, JobStatus, OperationState, OperationStatus};
pub use oauth::{DEFAULT_REDIRECT_URI, DEFAULT_SCOPES, OAuthClient, OAuthError, OAuthToken};
pub use path::{PathError, join_path, normalize_path, split_parent};

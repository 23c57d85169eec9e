//! Firebase App Distribution integration
//!
//! Uploads are asynchronous: the upload endpoint answers with a long-running
//! operation that is polled until the release has been processed. Release
//! notes and tester distribution are separate follow-up calls.
//!
//! ## Authentication
//!
//! A ready-made OAuth2 access token is sent as a bearer token. Minting the
//! token (service account, `gcloud auth print-access-token`) happens outside
//! this crate.

mod distribution;
mod operation;

pub use distribution::{
    Firebase, FirebaseConfig, FirebaseRelease, FirebaseRequest, FIREBASE_API_BASE,
};
pub use operation::{GoogleStatus, Operation, UploadReleaseResult};

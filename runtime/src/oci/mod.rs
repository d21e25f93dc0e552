//! OCI registry access for bundlecopy.
//!
//! - Image and repository reference parsing
//! - Manifest, index and image layout documents (`oci-spec` types)
//! - The [`Registry`] capability and its `oci-distribution` implementation
//!
//! # Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    OCI Image Layout                          │
//! │                                                              │
//! │  archive.tar                                                 │
//! │  ├── oci-layout           (OCI layout marker)               │
//! │  ├── index.json           (one entry per copied image)      │
//! │  └── blobs/                                                 │
//! │      └── sha256/                                            │
//! │          ├── <manifest>   (Image manifest or index)         │
//! │          ├── <config>     (Image configuration)             │
//! │          └── <layers>     (Filesystem layers)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod manifest;
pub mod reference;
pub mod registry;

pub use manifest::{Descriptor, OciDocument};
pub use reference::{ImageReference, RepositoryReference};
pub use registry::{FetchedManifest, OciRegistry, Registry};

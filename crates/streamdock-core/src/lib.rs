//! # StreamDock Core
//!
//! Extension lifecycle engine for StreamDock hosts.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | `store` | Directory of installed provider packages |
//! | `normalize` | Wraps legacy native modules into packages |
//! | `catalog` | Repository manifests and plugin lists over HTTP |
//! | `repository` | Subscribed repositories and their persisted list |
//! | `download` | Fetch, normalize and install artifacts |
//! | `loader` | Load packages into a provider registry |
//! | `fanout` | Call every loaded provider at once |
//! | `host` | Owns all of the above for one data directory |
//!
//! Data flows from repositories through the catalog client and downloader
//! into the store, and from the store through the loader to fan-out calls.

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod fanout;
pub mod host;
pub mod loader;
pub mod normalize;
pub mod package;
pub mod repository;
pub mod store;

pub use catalog::{CatalogClient, CatalogEntry, Repository, SitePlugin};
pub use config::HostConfig;
pub use download::{Downloaded, Downloader};
pub use error::{ConversionError, Error, LoadError, Result};
pub use host::Host;
pub use loader::{
    Candidate, ExtensionLoader, InProcessResolver, LoadStatus, LoadedProvider, ModuleResolver,
    NativeResolver, ProviderHandle, UninstallOutcome,
};
pub use normalize::{Conversion, Normalized, Normalizer, SourceFormat};
pub use package::PackageManifest;
pub use repository::RepositoryRegistry;
pub use store::{Artifact, ArtifactState, ArtifactStore};

/// Provider contract re-exported for hosts.
pub use streamdock_provider_sdk as sdk;

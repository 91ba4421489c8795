//! StreamDock Provider SDK
//!
//! Everything a provider package needs to be discovered by the StreamDock
//! extension loader: the [`Provider`] capability contract, the result types it
//! returns, and the [`export_provider!`] macro that emits the native entry
//! points.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use streamdock_provider_sdk::prelude::*;
//!
//! #[derive(Default)]
//! struct MyProvider;
//!
//! impl Provider for MyProvider {
//!     fn name(&self) -> &str {
//!         "My Provider"
//!     }
//!
//!     fn search(&self, query: &str) -> ProviderResult<Vec<SearchResult>> {
//!         Ok(vec![SearchResult::new(query, "https://example.com/1", MediaKind::Movie)])
//!     }
//! }
//!
//! export_provider!(MyProvider);
//! ```
//!
//! Build the crate as a `cdylib`, then either drop the library into a provider
//! package (`.sdx`, a ZIP archive) or publish the bare library as a legacy
//! module (`.sdm`) and let the host normalize it.

pub mod abi;
pub mod error;
#[macro_use]
pub mod macros;
pub mod types;

pub use abi::{
    AbiVersionFn, ProviderBox, ProviderCreateFn, ProviderDestroyFn, ABI_VERSION_SYMBOL,
    CREATE_SYMBOL, DESTROY_SYMBOL, PROVIDER_ABI_VERSION,
};
pub use error::{ProviderError, ProviderResult};
pub use types::{MediaKind, Provider, SearchResult};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::error::{ProviderError, ProviderResult};
    pub use crate::types::{MediaKind, Provider, SearchResult};
    pub use crate::export_provider;
}

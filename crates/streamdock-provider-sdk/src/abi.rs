//! Native entry points shared by the host and provider libraries.
//!
//! A provider library exports three symbols:
//! - `streamdock_provider_abi_version()` -> u32 (must equal [`PROVIDER_ABI_VERSION`])
//! - `streamdock_provider_create()` -> `*mut ProviderBox` (null on failure)
//! - `streamdock_provider_destroy(*mut ProviderBox)`
//!
//! The instance crosses the boundary as a thin pointer to a boxed trait
//! object, so host and provider must be built with the same toolchain.

use crate::types::Provider;

/// Incremented when the `Provider` trait or the entry points change.
pub const PROVIDER_ABI_VERSION: u32 = 1;

pub const ABI_VERSION_SYMBOL: &[u8] = b"streamdock_provider_abi_version";
pub const CREATE_SYMBOL: &[u8] = b"streamdock_provider_create";
pub const DESTROY_SYMBOL: &[u8] = b"streamdock_provider_destroy";

/// The heap cell handed across the library boundary.
pub type ProviderBox = Box<dyn Provider>;

pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

#[allow(improper_ctypes_definitions)]
pub type ProviderCreateFn = unsafe extern "C" fn() -> *mut ProviderBox;

#[allow(improper_ctypes_definitions)]
pub type ProviderDestroyFn = unsafe extern "C" fn(instance: *mut ProviderBox);

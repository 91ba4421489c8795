//! Declarative macros for provider development.

/// Export the native entry points for a provider type.
///
/// The type must implement [`Provider`](crate::Provider) and [`Default`]; the
/// loader instantiates it through `Default::default()`.
///
/// # Example
///
/// ```rust,ignore
/// use streamdock_provider_sdk::prelude::*;
///
/// #[derive(Default)]
/// struct MyProvider;
///
/// export_provider!(MyProvider);
/// ```
#[macro_export]
macro_rules! export_provider {
    ($ty:ty) => {
        #[no_mangle]
        pub extern "C" fn streamdock_provider_abi_version() -> u32 {
            $crate::PROVIDER_ABI_VERSION
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn streamdock_provider_create() -> *mut $crate::ProviderBox {
            // A panic must not unwind into the host.
            let created = ::std::panic::catch_unwind(|| {
                let provider: $crate::ProviderBox =
                    ::std::boxed::Box::new(<$ty as ::std::default::Default>::default());
                provider
            });

            match created {
                Ok(provider) => ::std::boxed::Box::into_raw(::std::boxed::Box::new(provider)),
                Err(_) => ::std::ptr::null_mut(),
            }
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn streamdock_provider_destroy(instance: *mut $crate::ProviderBox) {
            if !instance.is_null() {
                // SAFETY: instance was produced by streamdock_provider_create
                drop(unsafe { ::std::boxed::Box::from_raw(instance) });
            }
        }
    };
}

//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`NonVolatileStore`] for the bridge.  Keys are
//! `"namespace/name"`; the namespace maps onto an NVS namespace and the
//! name onto a blob key inside it.  Both parts are limited to 15 bytes by
//! ESP-IDF.
//!
//! - **`target_os = "espidf"`**: `nvs_*` blob API.  Each `persist` is
//!   committed before returning, and NVS commits are atomic.
//! - **all other targets**: in-memory map for host-side testing.

use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::error::StoreError;
use crate::hal::NonVolatileStore;

/// ESP-IDF limit for namespace and key names (excluding NUL).
const MAX_NAME_LEN: usize = 15;

/// Largest blob accepted.
const MAX_BLOB_SIZE: usize = 4000;

/// Namespace used when a key carries no `/`.
const DEFAULT_NAMESPACE: &str = "bridge";

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    read_only: bool,
}

/// Split `"ns/name"` and NUL-terminate both halves for the C API.
fn split_key(key: &str) -> Result<([u8; 16], [u8; 16]), StoreError> {
    let (ns, name) = key.split_once('/').unwrap_or((DEFAULT_NAMESPACE, key));
    if ns.is_empty() || name.is_empty() || ns.len() > MAX_NAME_LEN || name.len() > MAX_NAME_LEN {
        return Err(StoreError::KeyTooLong);
    }
    let mut ns_buf = [0u8; 16];
    ns_buf[..ns.len()].copy_from_slice(ns.as_bytes());
    let mut name_buf = [0u8; 16];
    name_buf[..name.len()].copy_from_slice(name.as_bytes());
    Ok((ns_buf, name_buf))
}

impl NvsStore {
    /// Open the store, initialising NVS flash on the device.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StoreError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StoreError::Io);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StoreError::Io);
                }
            } else if ret != ESP_OK {
                return Err(StoreError::Io);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsStore: simulation backend");
            Ok(Self {
                store: HashMap::new(),
                read_only: false,
            })
        }
    }

    /// Make every subsequent `persist` fail (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &[u8; 16], write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(namespace.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl NonVolatileStore for NvsStore {
    fn persist(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let (ns, name) = split_key(key)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(StoreError::ValueTooLarge);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (ns, name);
            if self.read_only {
                return Err(StoreError::Io);
            }
            self.store.insert(key.to_owned(), bytes.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(&ns, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(handle, name.as_ptr().cast(), bytes.as_ptr().cast(), bytes.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => Ok(()),
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StoreError::Full),
                Err(e) => {
                    warn!("NvsStore: write '{}' failed ({})", key, e);
                    Err(StoreError::Io)
                }
            }
        }
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let (ns, name) = split_key(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = (ns, name);
            Ok(self.store.get(key).cloned())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(&ns, false, |handle| {
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(handle, name.as_ptr().cast(), core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(handle, name.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                buf.truncate(size);
                Ok(buf)
            });
            match result {
                Ok(bytes) => Ok(Some(bytes)),
                // A namespace that was never written cannot be opened read-only.
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(None),
                Err(e) => {
                    warn!("NvsStore: read '{}' failed ({})", key, e);
                    Err(StoreError::Io)
                }
            }
        }
    }
}

impl Default for NvsStore {
    fn default() -> Self {
        // Falls back to a store whose writes will fail on the device.
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
            #[cfg(not(target_os = "espidf"))]
            read_only: false,
        })
    }
}

use crate::{Cache, CacheError};
use std::{ffi::CStr, os::raw::c_char, ptr, slice};
use tracing::error;

unsafe fn path_str<'a>(ptr: *const c_char, what: &str) -> Option<&'a str> {
    if ptr.is_null() {
        error!("{} is null", what);
        return None;
    }

    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(err) => {
            error!("{} is not valid UTF-8: {}", what, err);
            None
        }
    }
}

unsafe fn into_raw_buffer(result: Result<Vec<u8>, CacheError>, out_len: *mut u32) -> *mut u8 {
    match result {
        Ok(buf) => {
            *out_len = buf.len() as u32;
            Box::into_raw(buf.into_boxed_slice()) as *mut u8
        }
        Err(err) => {
            error!("failed reading from cache: {}", err);
            ptr::null_mut()
        }
    }
}

/// Open a cache at the given path
///
/// # Arguments
///
/// * `path` - The path to the cache directory
///
/// # Returns
///
/// A pointer to the cache, or null if the cache could not be opened
///
/// # Safety
///
/// `path` must be null or point to a nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cache_open(path: *const c_char) -> *mut Cache {
    let Some(path) = path_str(path, "cache path") else {
        return ptr::null_mut();
    };

    match Cache::open(path) {
        Ok(cache) => Box::into_raw(Box::new(cache)),
        Err(err) => {
            error!("failed opening cache at {}: {}", path, err);
            ptr::null_mut()
        }
    }
}

/// Read a file from the cache
///
/// # Arguments
///
/// * `cache_ptr` - The cache to read from
/// * `archive` - The archive to read from
/// * `group` - The group to read from
/// * `file` - The file to read
/// * `xtea_keys` - The optional XTEA keys to use for decryption, may be null
/// * `out_len` - The length of the returned buffer
///
/// # Returns
///
/// A pointer to the file data, whose length is stored in `out_len`, or null on
/// failure. The caller frees the buffer with `cache_free`.
///
/// # Safety
///
/// `cache_ptr` must come from `cache_open`, `xtea_keys` must be null or point
/// to four `u32`s, and `out_len` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cache_read(
    cache_ptr: *const Cache,
    archive: u8,
    group: u32,
    file: u16,
    xtea_keys: *const [u32; 4],
    out_len: *mut u32,
) -> *mut u8 {
    if cache_ptr.is_null() || out_len.is_null() {
        error!("cache_read called with a null cache or length pointer");
        return ptr::null_mut();
    }
    let cache = &*cache_ptr;

    let xtea_keys = xtea_keys.as_ref().copied();
    into_raw_buffer(cache.read(archive, group, file, xtea_keys), out_len)
}

/// Read a file from a named group of the cache
///
/// # Arguments
///
/// * `cache_ptr` - The cache to read from
/// * `archive` - The archive to read from
/// * `group` - The name of the group
/// * `file` - The file to read
/// * `xtea_keys` - The optional XTEA keys to use for decryption, may be null
/// * `out_len` - The length of the returned buffer
///
/// # Returns
///
/// A pointer to the file data, whose length is stored in `out_len`, or null on
/// failure. The caller frees the buffer with `cache_free`.
///
/// # Safety
///
/// As `cache_read`; `group` must be null or point to a nul-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cache_read_named_group(
    cache_ptr: *const Cache,
    archive: u8,
    group: *const c_char,
    file: u16,
    xtea_keys: *const [u32; 4],
    out_len: *mut u32,
) -> *mut u8 {
    if cache_ptr.is_null() || out_len.is_null() {
        error!("cache_read_named_group called with a null cache or length pointer");
        return ptr::null_mut();
    }
    let cache = &*cache_ptr;

    let Some(group) = path_str(group, "group name") else {
        return ptr::null_mut();
    };

    let xtea_keys = xtea_keys.as_ref().copied();
    into_raw_buffer(
        cache.read_named_group(archive, group, file, xtea_keys),
        out_len,
    )
}

/// Free a buffer returned by the cache read functions
///
/// # Arguments
///
/// * `buffer` - The buffer to free
/// * `len` - The length reported through `out_len` when the buffer was returned
///
/// # Safety
///
/// `buffer` must be null or a buffer returned by `cache_read` or
/// `cache_read_named_group` that has not been freed yet, with its original length.
#[no_mangle]
pub unsafe extern "C" fn cache_free(buffer: *mut u8, len: u32) {
    if !buffer.is_null() {
        drop(Box::from_raw(slice::from_raw_parts_mut(
            buffer,
            len as usize,
        )));
    }
}

/// Close a cache
///
/// # Arguments
///
/// * `cache_ptr` - The cache to close
///
/// # Safety
///
/// - `cache_ptr` must be null or come from `cache_open`.
/// - The cache must not be used after it has been closed.
#[no_mangle]
pub unsafe extern "C" fn cache_close(cache_ptr: *mut Cache) {
    if !cache_ptr.is_null() {
        drop(Box::from_raw(cache_ptr))
    }
}

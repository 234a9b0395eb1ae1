/*!
Memory and handle callbacks of the host.

Every function answers immediately from the global proxy. Failures are reported
as `false` (or a null handle) and a zero byte count.
*/

use memproxy::error::{Error, ErrorKind, ErrorOrigin, Result};
use memproxy::intercept::InterceptLayer;
use memproxy::types::{Address, TargetHandle};

use std::slice::{from_raw_parts, from_raw_parts_mut};

use log::debug;

use crate::PROXY;

fn with_intercept<T>(func: impl FnOnce(&InterceptLayer) -> Result<T>) -> Result<T> {
    let proxy = PROXY.read();
    let proxy = proxy
        .as_ref()
        .ok_or(Error(ErrorOrigin::FFI, ErrorKind::Uninitialized))?;
    func(proxy.intercept())
}

unsafe fn report_bytes(result: Result<usize>, bytes: *mut usize) -> bool {
    let (ok, count) = match result {
        Ok(count) => (true, count),
        Err(err) => {
            debug!("{}", err);
            (false, 0)
        }
    };

    if !bytes.is_null() {
        *bytes = count;
    }
    ok
}

fn report_handle(result: Result<TargetHandle>) -> usize {
    match result {
        Ok(handle) => handle.as_raw(),
        Err(err) => {
            debug!("{}", err);
            TargetHandle::NULL.as_raw()
        }
    }
}

/// Reads `size` bytes at `address` of the target into `buffer`.
///
/// # Safety
///
/// `buffer` must be valid for `size` bytes, `bytes_read` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn memproxy_read(
    address: u64,
    buffer: *mut u8,
    size: usize,
    bytes_read: *mut usize,
) -> bool {
    let result = if buffer.is_null() || size == 0 {
        Err(Error(ErrorOrigin::FFI, ErrorKind::ArgValidation))
    } else {
        let out = from_raw_parts_mut(buffer, size);
        with_intercept(|intercept| intercept.read(Address::from(address), out))
    };
    report_bytes(result, bytes_read)
}

/// Queues a write of `size` bytes from `buffer` to `address` of the target.
///
/// # Safety
///
/// `buffer` must be valid for `size` bytes, `bytes_written` must be null or valid.
#[no_mangle]
pub unsafe extern "C" fn memproxy_write(
    address: u64,
    buffer: *const u8,
    size: usize,
    bytes_written: *mut usize,
) -> bool {
    let result = if buffer.is_null() || size == 0 {
        Err(Error(ErrorOrigin::FFI, ErrorKind::ArgValidation))
    } else {
        let data = from_raw_parts(buffer, size);
        with_intercept(|intercept| intercept.write(Address::from(address), data))
    };
    report_bytes(result, bytes_written)
}

/// Returns a placeholder handle for `pid`, or 0 on failure.
///
/// `inherit` is accepted for signature compatibility and ignored.
#[no_mangle]
pub extern "C" fn memproxy_open_process(access: u32, _inherit: i32, pid: u32) -> usize {
    report_handle(with_intercept(|intercept| {
        intercept.open_process(access, pid)
    }))
}

/// Returns a placeholder handle for the thread `tid`, or 0 on failure.
#[no_mangle]
pub extern "C" fn memproxy_open_thread(access: u32, _inherit: i32, tid: u32) -> usize {
    report_handle(with_intercept(|intercept| {
        intercept.open_thread(access, tid)
    }))
}

/// Queues a close of `handle`. Returns false only if the proxy is not initialized.
#[no_mangle]
pub extern "C" fn memproxy_close_process(handle: usize) -> bool {
    with_intercept(|intercept| {
        intercept.close_process(TargetHandle::from_raw(handle));
        Ok(())
    })
    .is_ok()
}

/// Sets the attached target directly, `pid = 0` detaches.
#[no_mangle]
pub extern "C" fn memproxy_set_target(pid: u32) -> bool {
    with_intercept(|intercept| {
        intercept.set_target(pid);
        Ok(())
    })
    .is_ok()
}

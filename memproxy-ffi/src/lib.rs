/*!
C bindings for memproxy.

A host loads this library, installs a send callback with [`memproxy_init`] and
routes its memory and handle calls to the `memproxy_*` functions in [`intercept`].
All functions operate on a single process wide proxy instance.
*/

pub mod log;

pub mod channel;

pub mod intercept;

pub mod util;

use memproxy::config::ProxyArgs;
use memproxy::error::{Error, ErrorKind, ErrorOrigin, Result};
use memproxy::proxy::Proxy;

use std::ffi::{c_char, c_void, CStr};

use ::log::{info, trace};
use parking_lot::RwLock;

use channel::{FfiChannel, SendCallback};
use util::ToIntResult;

pub(crate) static PROXY: RwLock<Option<Proxy>> = parking_lot::const_rwlock(None);

/// Creates the global proxy.
///
/// `args` is an optional NUL terminated argument string (e.g. `freshness_ms=32,write_policy=invalidate`).
/// The worker is not started, see [`memproxy_state_change`].
///
/// Returns 0 on success or a negative error code.
///
/// # Safety
///
/// `args` must be null or point to a valid NUL terminated string. `ctx` is passed
/// to `send` unchanged and has to stay valid until [`memproxy_free`] returns.
#[no_mangle]
pub unsafe extern "C" fn memproxy_init(
    send: Option<SendCallback>,
    ctx: *mut c_void,
    args: *const c_char,
) -> i32 {
    init(send, ctx, args).int_result_logged()
}

unsafe fn init(send: Option<SendCallback>, ctx: *mut c_void, args: *const c_char) -> Result<()> {
    let send = send.ok_or(Error(ErrorOrigin::FFI, ErrorKind::ArgValidation))?;

    let args = if args.is_null() {
        ProxyArgs::new()
    } else {
        let args = CStr::from_ptr(args)
            .to_str()
            .map_err(|err| Error(ErrorOrigin::FFI, ErrorKind::Encoding).log_error(err))?;
        ProxyArgs::parse(args)?
    };

    let mut global = PROXY.write();
    if global.is_some() {
        return Err(Error(ErrorOrigin::FFI, ErrorKind::AlreadyRunning));
    }

    let proxy = Proxy::builder(FfiChannel::new(send, ctx))
        .args(&args)?
        .build()?;
    info!("proxy initialized with {:?}", proxy.config());
    *global = Some(proxy);

    Ok(())
}

/// Stops the worker and drops the global proxy. Queued jobs are discarded.
#[no_mangle]
pub extern "C" fn memproxy_free() {
    let proxy = PROXY.write().take();
    if proxy.is_some() {
        trace!("memproxy_free");
    }
}

/// Starts (`enabled = true`) or stops the worker. Repeated calls are no-ops.
///
/// Returns false if the proxy was not initialized.
#[no_mangle]
pub extern "C" fn memproxy_state_change(enabled: bool) -> bool {
    match PROXY.read().as_ref() {
        Some(proxy) => {
            if enabled {
                proxy.enable();
            } else {
                proxy.disable();
            }
            true
        }
        None => false,
    }
}

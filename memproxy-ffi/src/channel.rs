/*!
Adapter turning a host provided send callback into a [`RemoteChannel`].
*/

use memproxy::error::{Error, ErrorKind, ErrorOrigin};
use memproxy::remote::RemoteChannel;

use std::ffi::{c_char, c_void, CString};
use std::slice::from_raw_parts;
use std::time::Duration;

use log::trace;

/// Host callback that delivers a NUL terminated command to the remote peer.
///
/// The callback blocks for at most `timeout_ms`, stores the answer through
/// [`memproxy_response_set`] and returns `true`. Returning `false` signals that
/// no response arrived.
pub type SendCallback = extern "C" fn(
    ctx: *mut c_void,
    command: *const c_char,
    timeout_ms: u32,
    response: *mut ResponseBuffer,
) -> bool;

/// Response slot handed to a [`SendCallback`].
#[derive(Default)]
pub struct ResponseBuffer {
    data: Option<String>,
}

impl ResponseBuffer {
    pub fn take(&mut self) -> Option<String> {
        self.data.take()
    }
}

/// Stores `len` bytes at `data` as the response of the current command.
///
/// Invalid utf-8 sequences are replaced, the protocol layer rejects the
/// response afterwards.
///
/// # Safety
///
/// `response` has to be the pointer passed into the send callback and `data`
/// must be valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn memproxy_response_set(
    response: *mut ResponseBuffer,
    data: *const u8,
    len: usize,
) -> bool {
    if response.is_null() || (data.is_null() && len > 0) {
        return false;
    }

    let bytes = if len > 0 { from_raw_parts(data, len) } else { &[] };
    (*response).data = Some(String::from_utf8_lossy(bytes).into_owned());
    true
}

/// A [`RemoteChannel`] backed by a host callback and its opaque context.
pub struct FfiChannel {
    send: SendCallback,
    // stored as an integer so the channel can cross threads,
    // the host guarantees the context outlives the proxy
    ctx: usize,
}

impl FfiChannel {
    pub fn new(send: SendCallback, ctx: *mut c_void) -> Self {
        Self {
            send,
            ctx: ctx as usize,
        }
    }
}

impl RemoteChannel for FfiChannel {
    fn send(&self, command: &str, timeout: Duration) -> Option<String> {
        let command = CString::new(command)
            .map_err(|err| Error(ErrorOrigin::FFI, ErrorKind::Encoding).log_warn(err))
            .ok()?;
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);

        let mut response = ResponseBuffer::default();
        let answered = (self.send)(
            self.ctx as *mut c_void,
            command.as_ptr(),
            timeout_ms,
            &mut response,
        );
        trace!("send: answered={} timeout={}ms", answered, timeout_ms);

        if answered {
            response.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    extern "C" fn echo(
        _ctx: *mut c_void,
        command: *const c_char,
        _timeout_ms: u32,
        response: *mut ResponseBuffer,
    ) -> bool {
        let bytes = unsafe { CStr::from_ptr(command) }.to_bytes();
        unsafe { memproxy_response_set(response, bytes.as_ptr(), bytes.len()) }
    }

    extern "C" fn timeout(
        ctx: *mut c_void,
        _command: *const c_char,
        timeout_ms: u32,
        _response: *mut ResponseBuffer,
    ) -> bool {
        unsafe { *(ctx as *mut u32) = timeout_ms };
        false
    }

    #[test]
    fn echo_roundtrip() {
        let channel = FfiChannel::new(echo, std::ptr::null_mut());
        assert_eq!(
            channel.send(r#"{"cmd":"close_process"}"#, Duration::from_millis(500)),
            Some(r#"{"cmd":"close_process"}"#.to_string())
        );
    }

    #[test]
    fn no_answer() {
        let mut seen = 0u32;
        let channel = FfiChannel::new(timeout, &mut seen as *mut u32 as *mut c_void);
        assert_eq!(channel.send("{}", Duration::from_millis(200)), None);
        assert_eq!(seen, 200);
    }

    #[test]
    fn interior_nul() {
        let channel = FfiChannel::new(echo, std::ptr::null_mut());
        assert_eq!(channel.send("a\0b", Duration::from_millis(100)), None);
    }

    #[test]
    fn response_set_null() {
        let mut response = ResponseBuffer::default();
        unsafe {
            assert!(!memproxy_response_set(std::ptr::null_mut(), [1u8].as_ptr(), 1));
            assert!(!memproxy_response_set(&mut response, std::ptr::null(), 4));
            assert!(memproxy_response_set(&mut response, std::ptr::null(), 0));
        }
        assert_eq!(response.take(), Some(String::new()));
    }
}

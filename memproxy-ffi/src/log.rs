use memproxy::error::{Error, ErrorKind, ErrorOrigin};

use log::Level;

use crate::util::ToIntResult;

/// Installs a stderr logger at the given verbosity (0 = error .. 4 = trace).
///
/// Returns 0 on success. A logger can only be installed once per process,
/// later calls return an error code and leave the existing logger in place.
#[no_mangle]
pub extern "C" fn memproxy_log_init(level_num: i32) -> i32 {
    let level = match level_num {
        0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        4 => Level::Trace,
        _ => Level::Trace,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level.to_level_filter())
        .init()
        .map_err(|_| Error(ErrorOrigin::FFI, ErrorKind::AlreadyRunning))
        .int_result()
}

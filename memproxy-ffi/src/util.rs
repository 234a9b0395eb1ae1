use memproxy::error::Result;

use log::error;

pub fn inspect_err<E: std::fmt::Display>(e: E) -> E {
    error!("{}", e);
    e
}

pub trait ToIntResult {
    fn int_result(self) -> i32;

    fn int_result_logged(self) -> i32
    where
        Self: Sized,
    {
        let res = self.int_result();
        if res != 0 {
            error!("err value: {}", res);
        }
        res
    }
}

impl<T> ToIntResult for Result<T> {
    fn int_result(self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(e) => e.into_i32(),
        }
    }

    fn int_result_logged(self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(e) => inspect_err(e).into_i32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memproxy::error::{Error, ErrorKind, ErrorOrigin};

    #[test]
    fn int_result_codes() {
        let ok: Result<usize> = Ok(4);
        assert_eq!(ok.int_result(), 0);

        let err: Result<usize> = Err(Error(ErrorOrigin::FFI, ErrorKind::NotFound));
        let code = err.int_result_logged();
        assert!(code < 0);
        assert_eq!(
            Error::from_i32(code),
            Error(ErrorOrigin::FFI, ErrorKind::NotFound)
        );
    }
}

//! Macros for building and returning [`Report`](crate::error::Report)s.

#[macro_export]
/// Build a [`Report`](crate::error::Report) around `$err`, attaching each `$attachment` in order.
macro_rules! report_attach {
    ($err:expr $(, $($attachment:expr),+)? $(,)?) => {
        $crate::error::Report::new($err)
            $($(.attach_printable($attachment))+)?
    };
}

#[macro_export]
/// Return early with `$err` wrapped in a [`Report`](crate::error::Report), attaching each `$attachment`.
///
/// The trailing `?` lets the report convert into any error type implementing `From<Report<_>>`.
macro_rules! bail_attach {
    ($err:expr $(, $($attachment:expr),+)? $(,)?) => {
        return Err($crate::report_attach!($err $(, $($attachment),+)?))?
    };
}

#[macro_export]
/// Return early with `$err` unless `$cond` holds. The failed condition is attached to the report.
macro_rules! ensure_attach {
    ($cond:expr, $err:expr $(, $($attachment:expr),+)? $(,)?) => {{
        let cond: bool = $cond;
        if !cond {
            $crate::bail_attach!($err, concat!("condition failed: ", stringify!($cond)) $(, $($attachment),+)?);
        }
    }};
}

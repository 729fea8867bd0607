//! Logging macros.

/// Evaluates the given expression and logs how long it took at info level.
#[macro_export]
macro_rules! with_timing_info_logging {
    ($message:expr $(,$arg:expr)*; $expression:expr) => {{
        let _start_time = ::std::time::Instant::now();
        let _result = $expression;
        let _duration = _start_time.elapsed();
        $crate::info!(
            concat!($message, " took {:.2} ms")$(,$arg)*,
            _duration.as_secs_f64() * 1e3,
        );
        _result
    }};
}

/// Evaluates the given expression, emitting a trace message before and after
/// evaluation. The closing message includes the elapsed time. Nothing is
/// timed when trace logging is disabled.
#[macro_export]
macro_rules! with_trace_logging {
    ($message:expr $(,$arg:expr)*; $expression:expr) => {{
        if $crate::log_enabled!($crate::Level::Trace) {
            $crate::trace!(concat!("Begin: ", $message)$(,$arg)*);
            let _start_time = ::std::time::Instant::now();
            let _result = $expression;
            let _duration = _start_time.elapsed();
            $crate::trace!(
                concat!("({:.2} ms) Done: ", $message),
                _duration.as_secs_f64() * 1e3
                $(,$arg)*
            );
            _result
        } else {
            $expression
        }
    }};
}

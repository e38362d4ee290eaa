/// Conditional logging module for development builds
///
/// The `log!` macro provides informational logging that is compiled out
/// in production (release) builds by default. Errors and warnings should continue
/// using `log::error!` and `log::warn!` directly.
///
/// Logging is enabled when either:
/// - Building in debug mode (`cfg(debug_assertions)`)
/// - The `console_logging` feature is explicitly enabled
///
/// # Examples
///
/// ```rust
/// use merge_planner::logging::log;
///
/// let vehicle = "m.0";
/// log!("Admitting vehicle {}", vehicle);
/// log!("Admission took {:.2}ms", 1.5);
/// ```
/// Conditionally forward to `log::info!` in development builds
///
/// This macro expands to `log::info!()` in debug builds or when the
/// `console_logging` feature is enabled. In production release builds,
/// it compiles to nothing (zero overhead).
#[macro_export]
macro_rules! log {
    ($($arg:tt)+) => {
        #[cfg(any(debug_assertions, feature = "console_logging"))]
        {
            $crate::log_facade::info!($($arg)+);
        }
    };
}

pub use crate::log;

#![allow(unused_macros)]
//! Diagnostics emitted by the pipeline about itself.
//!
//! These macros are meant for exporters, processors and other pipeline
//! components, not for application logging. Each event carries a stable
//! `name` plus optional `key = value` fields:
//!
//! ```rust
//! use telepipe::otel_warn;
//! otel_warn!(name: "PeriodicReader.ExportFailed", error = "collector unavailable");
//! ```
//!
//! With the `internal-logs` feature the events go to `tracing` with the
//! emitting crate's name as target. Under `cfg(test)` they are also printed,
//! which shows up with `--nocapture`.

#[doc(hidden)]
#[macro_export]
macro_rules! __otel_log {
    ($level:ident, $label:literal, name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            println!("{}: name={}", $label, $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    ($level:ident, $label:literal, name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name,
                $($key = $value),+
            );
        }

        #[cfg(test)]
        {
            print!("{}: name={}", $label, $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Log an informational event about the pipeline itself.
#[macro_export]
macro_rules! otel_info {
    ($($args:tt)*) => {
        $crate::__otel_log!(info, "otel_info", $($args)*)
    };
}

/// Log a recoverable problem: dropped batches, failed exports, bad input.
#[macro_export]
macro_rules! otel_warn {
    ($($args:tt)*) => {
        $crate::__otel_log!(warn, "otel_warn", $($args)*)
    };
}

/// Log verbose detail, such as the start and end of every export.
#[macro_export]
macro_rules! otel_debug {
    ($($args:tt)*) => {
        $crate::__otel_log!(debug, "otel_debug", $($args)*)
    };
}

/// Log a programming error or an unrecoverable pipeline failure.
#[macro_export]
macro_rules! otel_error {
    ($($args:tt)*) => {
        $crate::__otel_log!(error, "otel_error", $($args)*)
    };
}

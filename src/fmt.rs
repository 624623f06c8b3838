//! Internal logging macros
//!
//! Forward to `defmt` on the embedded build. On the host build the
//! arguments are still evaluated by reference but nothing is emitted.

#![allow(unused_macros)]

macro_rules! trace {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "embedded")]
        defmt::trace!($fmt $(, $arg)*);
        #[cfg(not(feature = "embedded"))]
        let _ = ($(&$arg,)*);
    }};
}

macro_rules! debug {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "embedded")]
        defmt::debug!($fmt $(, $arg)*);
        #[cfg(not(feature = "embedded"))]
        let _ = ($(&$arg,)*);
    }};
}

macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "embedded")]
        defmt::info!($fmt $(, $arg)*);
        #[cfg(not(feature = "embedded"))]
        let _ = ($(&$arg,)*);
    }};
}

macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(feature = "embedded")]
        defmt::warn!($fmt $(, $arg)*);
        #[cfg(not(feature = "embedded"))]
        let _ = ($(&$arg,)*);
    }};
}

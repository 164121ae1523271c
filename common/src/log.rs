//! Logging helpers shared by every crate.
//!
//! Everything goes through `tracing`. The only addition is [`success!`],
//! which is an `info` event on a dedicated target so the CLI formatter can
//! render it with its own glyph.

pub const SUCCESS_TARGET: &str = "hubkit::success";

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(target: $crate::log::SUCCESS_TARGET, $($arg)*)
    };
}

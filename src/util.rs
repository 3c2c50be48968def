use std::any::Any;

use anyhow::anyhow;

/// Turn a panic payload into a readable error. Panic messages are almost
/// always `&str` or `String`; anything else gets a generic label.
pub(crate) fn try_to_extract_panic_info(info: &(dyn Any + Send + 'static)) -> anyhow::Error {
    if let Some(message) = info.downcast_ref::<&str>() {
        anyhow!("runner panicked: {message}")
    } else if let Some(message) = info.downcast_ref::<String>() {
        anyhow!("runner panicked: {message}")
    } else {
        anyhow!("runner panicked")
    }
}

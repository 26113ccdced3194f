mod atoms;
mod updater;

pub use atoms::{Dictionary, GRAM_REFRESH};
pub use updater::DictionaryUpdater;

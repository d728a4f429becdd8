mod coalesce;
pub mod equalizer;
pub(crate) mod switch;

pub use coalesce::ParamCoalescer;
pub use equalizer::{
    BAND_COUNT, BAND_FREQUENCIES_HZ, EqualizerDsp, EqualizerState, MAX_GAIN_DB, MIN_GAIN_DB,
    preset_gains, preset_names,
};

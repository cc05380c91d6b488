//! Run configuration.
//!
//! All settings live in a single TOML (or JSON) file with one section per
//! concern:
//!
//! ```toml
//! [data]
//! root = "data/Raw data"
//! output = "result"
//! analysis_name = "Gap Analysis"
//!
//! [data.samples]
//! BeforeDetach = ["foil1", "foil2"]
//! AfterDetach = ["foil1", "foil2"]
//!
//! [filter]
//! min_fm_size = 100.0
//! max_fm_size = 700.0
//! excluded_fov_numbers = [25, 26, 29, 30]
//!
//! [matching]
//! distance_tolerance = 0.02
//! partition_keys = ["group_key", "top_bottom"]
//!
//! [compare]
//! before_state = "BeforeDetach"
//! after_state = "AfterDetach"
//! ```
//!
//! Missing sections and fields take their defaults.

mod error;
mod settings;

pub use error::ConfigLoadError;
pub use settings::{
    CompareSection, DataSection, FilterSection, ImagerySection, PlotSection, Settings,
};

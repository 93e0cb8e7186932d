pub mod consts;
pub mod correct;
pub mod curvature;
pub mod error;
pub mod finalize;
pub mod geometry;
pub mod io;
pub mod math;
pub mod mean_image;
pub mod pipeline;
pub mod reconstruct;
pub mod shifts;

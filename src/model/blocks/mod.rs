pub mod conv;
pub mod tconv;
pub mod crop;
pub mod normalize;

pub use conv::ValidConv;
pub use tconv::ValidTransposedConv;
pub use crop::{center_crop_to, Cropping2d};
pub use normalize::{Normalize, REFLECTANCE_SCALE};

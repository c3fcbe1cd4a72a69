#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use depthmatch_image as image;

#[doc(inline)]
pub use depthmatch_imgproc as imgproc;

#[doc(inline)]
pub use depthmatch_io as io;

#[doc(inline)]
pub use depthmatch_geometry as geometry;

#[doc(inline)]
pub use depthmatch_models as models;

pub mod batch;
pub mod image;

pub use self::batch::*;
pub use self::image::*;

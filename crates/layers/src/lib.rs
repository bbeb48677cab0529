pub mod layer;
pub mod map;
pub mod overlay;
pub mod raster;
pub mod symbology;

pub use layer::*;
pub use map::*;
pub use overlay::*;
pub use raster::*;
pub use symbology::*;

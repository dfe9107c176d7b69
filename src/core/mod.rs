pub mod etl;
pub mod geoprocessing;
pub mod layer_store;
pub mod projection;
pub mod spatial_index;

pub use crate::domain::model::{Record, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;

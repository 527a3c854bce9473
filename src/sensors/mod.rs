//! Camera-type sensors.

pub mod base_camera;
pub mod camera;
pub mod decode;
pub mod instance_camera;
pub mod tag_state;

pub use base_camera::{BaseCamera, Sensor, SensorFrame};
pub use camera::{Lens, RenderCamera};
pub use decode::{InstanceCounts, decode_instances, distinct_colors};
pub use instance_camera::InstanceCamera;
pub use tag_state::{
    CAMERA_TAG_STATE_KEY, TagStateError, TagStateRenderer, UnmappedObjectPolicy,
};

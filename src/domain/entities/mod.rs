mod delivery;
mod remote_image;
mod request_handle;

pub use delivery::{DeliveryContext, DeliveryJob, DeliveryQueue, DeliverySender};
pub use remote_image::{Image, ImageUrl, LoadResult};
pub use request_handle::{Completion, RequestHandle};

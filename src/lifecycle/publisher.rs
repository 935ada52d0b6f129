//! Registration of the service object on a handle.

use super::check;
use crate::{
    bus::BusConnection,
    error::{Result, SetupStep},
    object::{InterfaceDescriptor, ServiceObject},
};
use std::sync::Arc;

/// Publishes the object before the handle is named or attached, so no
/// request can reach the handle ahead of the registration.
///
/// 在句柄被命名或附加之前发布对象，因此不会有请求先于注册到达句柄。
pub struct ObjectPublisher;

impl ObjectPublisher {
    pub fn publish<C: BusConnection>(
        connection: &mut C,
        object: &Arc<ServiceObject>,
    ) -> Result<()> {
        let descriptor: Arc<dyn InterfaceDescriptor> = object.clone();
        check(
            connection.id(),
            SetupStep::AddObject,
            connection.add_object(object.object_path(), object.interface_name(), descriptor),
        )
    }
}

//! The object the service publishes, and the descriptor a bus reads it through.
//!
//! 服务发布的对象，以及总线读取它所用的描述符。

use crate::{
    config::ServiceConfig,
    error::{Error, Result},
};
use std::fmt;

/// A property value as seen by a peer.
///
/// 对端看到的属性值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
}

impl PropertyValue {
    /// The D-Bus type signature of the value.
    /// 该值的D-Bus类型签名。
    pub fn signature(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "s",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{} {:?}", self.signature(), s),
        }
    }
}

/// The static table describing what an object exposes and how to read it.
///
/// 描述对象公开哪些成员以及如何读取它们的静态表。
pub trait InterfaceDescriptor: Send + Sync + fmt::Debug {
    fn interface_name(&self) -> &str;

    fn property_names(&self) -> Vec<&str>;

    /// Type signature of property `name`, if the interface has it.
    fn signature(&self, name: &str) -> Option<&'static str> {
        self.get_property(name).ok().map(|value| value.signature())
    }

    /// Reads `name`. Unknown names yield `Error::UnknownProperty`.
    /// 读取 `name`。未知名称返回 `Error::UnknownProperty`。
    fn get_property(&self, name: &str) -> Result<PropertyValue>;
}

/// The single entity published on the bus. Constructed once and shared by
/// every connection handle, so each rebuild publishes identical state.
///
/// 在总线上发布的唯一实体。只构建一次并由所有连接句柄共享，
/// 因此每次重建发布的状态完全相同。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceObject {
    object_path: String,
    interface_name: String,
    property_name: String,
    property_value: String,
}

impl ServiceObject {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            object_path: config.object_path.clone(),
            interface_name: config.interface_name.clone(),
            property_name: config.property_name.clone(),
            property_value: config.property_value.clone(),
        }
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }
}

impl InterfaceDescriptor for ServiceObject {
    fn interface_name(&self) -> &str {
        &self.interface_name
    }

    fn property_names(&self) -> Vec<&str> {
        vec![self.property_name.as_str()]
    }

    fn get_property(&self, name: &str) -> Result<PropertyValue> {
        if name == self.property_name {
            Ok(PropertyValue::String(self.property_value.clone()))
        } else {
            Err(Error::UnknownProperty {
                name: name.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_configured_property() {
        let object = ServiceObject::new(&ServiceConfig::default());
        let value = object.get_property("Example").unwrap();
        assert_eq!(value, PropertyValue::String("example".into()));
        assert_eq!(value.signature(), "s");
        assert_eq!(value.to_string(), "s \"example\"");
        assert_eq!(object.property_names(), vec!["Example"]);
        assert_eq!(object.signature("Example"), Some("s"));
        assert_eq!(object.signature("Other"), None);
    }

    #[test]
    fn test_unknown_property_is_reported() {
        let object = ServiceObject::new(&ServiceConfig::default());
        for name in ["example", "Missing", ""] {
            match object.get_property(name) {
                Err(Error::UnknownProperty { name: n }) => assert_eq!(n, name),
                other => panic!("expected UnknownProperty for {name:?}, got {other:?}"),
            }
        }
    }
}

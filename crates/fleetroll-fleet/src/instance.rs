//! Instance handle.

use serde::Serialize;

use crate::api::InstanceDetails;

/// One running machine of a group.
///
/// The owning group is referenced by name only; standby transitions go
/// through the [`crate::Group`] handle that enumerated the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: String,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
    pub image_id: String,
    pub group: String,
}

impl Instance {
    pub fn from_details(group: &str, details: InstanceDetails) -> Self {
        Self {
            id: details.id,
            private_address: details.private_address,
            public_address: details.public_address,
            image_id: details.image_id,
            group: group.to_string(),
        }
    }

    /// Address the deploy runner connects to: private first, then public.
    /// `None` while the instance has not been assigned one yet.
    pub fn address(&self) -> Option<&str> {
        self.private_address
            .as_deref()
            .or(self.public_address.as_deref())
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(RecipientId);
id_newtype!(AddressId);
id_newtype!(ParcelId);

pub const ADMIN_ROLE: &str = "admin";
pub const USER_ROLE: &str = "user";

/// Lifecycle of a parcel. Only the administrative path moves a parcel past `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParcelStatus {
    Pending,
    Accepted,
    #[serde(rename = "Out For Delivery")]
    OutForDelivery,
    Delivered,
}

impl ParcelStatus {
    pub const ALL: [ParcelStatus; 4] = [
        ParcelStatus::Pending,
        ParcelStatus::Accepted,
        ParcelStatus::OutForDelivery,
        ParcelStatus::Delivered,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ParcelStatus::Pending => "Pending",
            ParcelStatus::Accepted => "Accepted",
            ParcelStatus::OutForDelivery => "Out For Delivery",
            ParcelStatus::Delivered => "Delivered",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

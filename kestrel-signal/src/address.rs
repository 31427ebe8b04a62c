// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured peer addresses of the form `user[:device]@server`.
//!
//! Phone-number (`pn`) and linked-identifier (`lid`) addresses each have a hosted variant
//! (`hosted`, `hosted.lid`). Classification is purely syntactic and based on the server part.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device index reserved for hosted endpoints.
pub const HOSTED_DEVICE_ID: u32 = 99;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    Pn,
    HostedPn,
    Lid,
    HostedLid,
    /// Any other server, for example group addresses.
    Other(String),
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Pn => "pn",
            Domain::HostedPn => "hosted",
            Domain::Lid => "lid",
            Domain::HostedLid => "hosted.lid",
            Domain::Other(server) => server,
        }
    }

    pub fn is_pn_class(&self) -> bool {
        matches!(self, Domain::Pn | Domain::HostedPn)
    }

    pub fn is_lid_class(&self) -> bool {
        matches!(self, Domain::Lid | Domain::HostedLid)
    }
}

impl From<&str> for Domain {
    fn from(server: &str) -> Self {
        match server {
            "pn" => Domain::Pn,
            "hosted" => Domain::HostedPn,
            "lid" => Domain::Lid,
            "hosted.lid" => Domain::HostedLid,
            other => Domain::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded address with bare user, optional device index and domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    pub user: String,
    pub device: Option<u32>,
    pub domain: Domain,
}

impl Address {
    pub fn new(user: impl Into<String>, device: Option<u32>, domain: Domain) -> Self {
        Self {
            user: user.into(),
            device,
            domain,
        }
    }

    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let (head, server) = value
            .rsplit_once('@')
            .ok_or_else(|| AddressError::MissingServer(value.to_string()))?;

        if server.is_empty() {
            return Err(AddressError::MissingServer(value.to_string()));
        }

        let (user, device) = match head.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u32>()
                    .map_err(|_| AddressError::InvalidDevice(value.to_string()))?;
                (user, Some(device))
            }
            None => (head, None),
        };

        if user.is_empty() {
            return Err(AddressError::MissingUser(value.to_string()));
        }

        Ok(Self::new(user, device, Domain::from(server)))
    }

    /// Rebuilds a device-specific address for a bare user.
    ///
    /// The device suffix is only kept when it is defined and non-zero. Device 99 selects the
    /// hosted variant of the requested namespace.
    ///
    /// The domain depends on the target namespace and the device alone, not on the domain of the
    /// address we translate from: `111:3@hosted` maps to `222:3@lid` and `111:99@hosted` to
    /// `222:99@hosted.lid`, in reverse `222@lid` always maps to a phone-number domain.
    pub fn device_specific(user: &str, device: Option<u32>, pn_namespace: bool) -> Self {
        let hosted = device == Some(HOSTED_DEVICE_ID);
        let domain = match (pn_namespace, hosted) {
            (true, true) => Domain::HostedPn,
            (true, false) => Domain::Pn,
            (false, true) => Domain::HostedLid,
            (false, false) => Domain::Lid,
        };
        Self::new(user, device.filter(|device| *device != 0), domain)
    }

    pub fn is_pn_user(&self) -> bool {
        self.domain == Domain::Pn
    }

    pub fn is_hosted_pn_user(&self) -> bool {
        self.domain == Domain::HostedPn
    }

    pub fn is_lid_user(&self) -> bool {
        self.domain == Domain::Lid
    }

    pub fn is_hosted_lid_user(&self) -> bool {
        self.domain == Domain::HostedLid
    }

    /// User-level address without device, hosted phone numbers collapse to `pn`.
    pub fn normalized_user(&self) -> Address {
        let domain = match &self.domain {
            Domain::HostedPn => Domain::Pn,
            domain => domain.clone(),
        };
        Self::new(self.user.clone(), None, domain)
    }

    pub fn to_protocol_address(&self) -> ProtocolAddress {
        ProtocolAddress::new(self.user.clone(), self.device.unwrap_or(0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Some(device) => write!(f, "{}:{}@{}", self.user, device, self.domain),
            None => write!(f, "{}@{}", self.user, self.domain),
        }
    }
}

/// Unit a pairwise session is keyed on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolAddress {
    pub name: String,
    pub device_id: u32,
}

impl ProtocolAddress {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// Group sender-key state is keyed on the group and the sending device.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SenderKeyName {
    pub group_id: String,
    pub sender: ProtocolAddress,
}

impl SenderKeyName {
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self {
            group_id: group_id.into(),
            sender,
        }
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.group_id, self.sender.name, self.sender.device_id
        )
    }
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("address {0} has no server part")]
    MissingServer(String),

    #[error("address {0} has no user part")]
    MissingUser(String),

    #[error("address {0} has an invalid device index")]
    InvalidDevice(String),
}

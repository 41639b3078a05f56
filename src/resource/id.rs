use std::fmt;
use std::str::FromStr;

use super::ResourceError;

pub const RESOURCE_ID_CAPACITY: usize = 31;

/// Fixed-capacity ASCII resource name, cheap to copy and hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    len: u8,
    bytes: [u8; RESOURCE_ID_CAPACITY],
}

impl ResourceId {
    pub fn new(id: &str) -> Result<Self, ResourceError> {
        let invalid = |reason| ResourceError::InvalidId {
            id: id.to_string(),
            reason,
        };

        if id.is_empty() {
            return Err(invalid("empty"));
        }
        if id.len() > RESOURCE_ID_CAPACITY {
            return Err(invalid("longer than 31 bytes"));
        }
        if !id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(invalid("must be printable ASCII without spaces"));
        }

        let mut bytes = [0u8; RESOURCE_ID_CAPACITY];
        bytes[..id.len()].copy_from_slice(id.as_bytes());
        Ok(Self {
            len: id.len() as u8,
            bytes,
        })
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl FromStr for ResourceId {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({:?})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_text() {
        let id = ResourceId::new("testse").unwrap();
        assert_eq!(id.as_str(), "testse");
        assert_eq!(id.to_string(), "testse");
        assert_eq!("testse".parse::<ResourceId>().unwrap(), id);
    }

    #[test]
    fn test_rejects_bad_ids() {
        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("has space").is_err());
        assert!(ResourceId::new(&"x".repeat(32)).is_err());
        assert!(ResourceId::new(&"x".repeat(31)).is_ok());
    }
}

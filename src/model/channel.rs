use std::fmt;

use crate::error::{Error, Result};

/// Highest valid style channel id.
pub const MAX_CHANNEL: u32 = 31;

/// A validated paint layer id (0-31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleChannel(u8);

impl StyleChannel {
    pub fn new(id: u32) -> Result<Self> {
        if id > MAX_CHANNEL {
            return Err(Error::ChannelOutOfRange(id));
        }
        Ok(Self(id as u8))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    /// Default channel for the plain underline style.
    pub const URL: StyleChannel = StyleChannel(29);

    /// Default channel for the text-foreground style.
    pub const URL_TEXT: StyleChannel = StyleChannel(30);
}

impl fmt::Display for StyleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_range() {
        assert_eq!(StyleChannel::new(0).unwrap().id(), 0);
        assert_eq!(StyleChannel::new(31).unwrap().id(), 31);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(matches!(
            StyleChannel::new(32),
            Err(Error::ChannelOutOfRange(32))
        ));
        assert!(StyleChannel::new(u32::MAX).is_err());
    }
}

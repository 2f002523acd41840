//! Short, human comparable codes derived from a content handle.
//!
//! Both peers compute the code on their own from the handle, so agreeing on
//! it needs no extra round trip. The code is a checksum meant to catch a
//! scanned wrong QR code or a typo in a manually entered ticket. Different
//! handles collide easily and it must not be treated as authentication.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DropError, DropResult};

/// Number of distinct confirmation codes.
pub const CODE_SPACE: u8 = 100;

/// A confirmation code in `[0, 100)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct ConfirmationCode(u8);

impl ConfirmationCode {
    pub fn new(value: u8) -> DropResult<Self> {
        if value >= CODE_SPACE {
            return Err(DropError::InvalidTicket(format!(
                "confirmation code {value} is outside 0..{CODE_SPACE}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ConfirmationCode {
    type Error = DropError;

    fn try_from(value: u8) -> DropResult<Self> {
        Self::new(value)
    }
}

impl From<ConfirmationCode> for u8 {
    fn from(code: ConfirmationCode) -> Self {
        code.0
    }
}

/// Two digits, so both screens show the same width.
impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Sums the code points of `handle` and reduces the sum modulo 100.
///
/// An empty handle yields `00`.
pub fn derive_confirmation_code(handle: &str) -> ConfirmationCode {
    let sum: u64 = handle.chars().map(|c| u64::from(u32::from(c))).sum();
    ConfirmationCode((sum % u64::from(CODE_SPACE)) as u8)
}

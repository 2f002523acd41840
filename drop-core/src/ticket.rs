//! The ticket string exchanged between sender and receiver.
//!
//! Wire form is ASCII `"<handle>:<code>"` where `code` is a base-10 integer
//! in `[0, 99]`. The handle is opaque and produced by the transfer engine; it
//! must be non-empty printable text with no surrounding whitespace. It must
//! not contain the separator, which keeps the split on the last `:`
//! unambiguous.

use std::{fmt, str::FromStr};

use crate::{
    confirmation::{derive_confirmation_code, ConfirmationCode},
    error::{DropError, DropResult},
};

pub const SEPARATOR: char = ':';

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    handle: String,
    code: ConfirmationCode,
}

impl Ticket {
    /// Builds the ticket a sender hands out for `handle`, with the derived
    /// confirmation code.
    pub fn for_handle(handle: impl Into<String>) -> DropResult<Self> {
        let handle = handle.into();
        check_handle(&handle)?;
        let code = derive_confirmation_code(&handle);
        Ok(Self { handle, code })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn code(&self) -> ConfirmationCode {
        self.code
    }

    /// Checks that the embedded code is the one derived from the handle.
    pub fn verify(&self) -> DropResult<()> {
        let expected = derive_confirmation_code(&self.handle);
        if expected != self.code {
            return Err(DropError::InvalidTicket(format!(
                "confirmation code {} does not belong to this handle",
                self.code
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.handle, SEPARATOR, self.code.value())
    }
}

impl FromStr for Ticket {
    type Err = DropError;

    fn from_str(s: &str) -> DropResult<Self> {
        decode(s)
    }
}

pub fn encode(handle: &str, code: u8) -> DropResult<String> {
    check_handle(handle)?;
    let code = ConfirmationCode::new(code)?;
    Ok(format!("{}{}{}", handle, SEPARATOR, code.value()))
}

pub fn decode(raw: &str) -> DropResult<Ticket> {
    let (handle, suffix) = raw.rsplit_once(SEPARATOR).ok_or_else(|| {
        DropError::InvalidTicket("missing confirmation separator".to_string())
    })?;

    if handle.is_empty() {
        return Err(DropError::InvalidTicket("empty handle".to_string()));
    }
    check_printable(handle)?;

    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DropError::InvalidTicket(format!(
            "confirmation code {suffix:?} is not a number"
        )));
    }

    let value: u32 = suffix.parse().map_err(|_| {
        DropError::InvalidTicket(format!(
            "confirmation code {suffix:?} is out of range"
        ))
    })?;
    let value = u8::try_from(value).map_err(|_| {
        DropError::InvalidTicket(format!(
            "confirmation code {value} is out of range"
        ))
    })?;

    Ok(Ticket {
        handle: handle.to_string(),
        code: ConfirmationCode::new(value)?,
    })
}

fn check_handle(handle: &str) -> DropResult<()> {
    if handle.is_empty() {
        return Err(DropError::InvalidTicket("empty handle".to_string()));
    }
    if handle.contains(SEPARATOR) {
        return Err(DropError::InvalidTicket(format!(
            "handle must not contain {SEPARATOR:?}"
        )));
    }
    check_printable(handle)
}

fn check_printable(handle: &str) -> DropResult<()> {
    if handle.chars().any(char::is_control) {
        return Err(DropError::InvalidTicket(
            "handle must be printable".to_string(),
        ));
    }
    if handle.trim() != handle {
        return Err(DropError::InvalidTicket(
            "handle must not start or end with whitespace".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode("ab", 95).unwrap(), "ab:95");
        assert_eq!(encode("ab", 5).unwrap(), "ab:5");
    }

    #[rstest]
    #[case("", 1)]
    #[case("a:b", 1)]
    #[case("ab", 100)]
    #[case(" ab", 1)]
    #[case("ab\t", 1)]
    #[case("a\nb", 1)]
    fn test_encode_rejects(#[case] handle: &str, #[case] code: u8) {
        assert!(matches!(
            encode(handle, code),
            Err(DropError::InvalidTicket(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let handle = "3f2a9c7e51d04b6e8a1f0c2b7d9e4a61";
        let code = derive_confirmation_code(handle);
        let ticket = decode(&encode(handle, code.value()).unwrap()).unwrap();
        assert_eq!(ticket.handle(), handle);
        assert_eq!(ticket.code(), code);
        assert!(ticket.verify().is_ok());
    }

    #[rstest]
    #[case("my files")]
    #[case("photos/2024 trip")]
    fn test_round_trip_printable_handles(#[case] handle: &str) {
        for code in [0, 7, 93, 99] {
            let raw = encode(handle, code).unwrap();
            let ticket = decode(&raw).unwrap();
            assert_eq!(ticket.handle(), handle);
            assert_eq!(ticket.code().value(), code);
            assert_eq!(ticket.to_string(), raw);
        }
        assert!(Ticket::for_handle(handle).unwrap().verify().is_ok());
    }

    #[test]
    fn test_decode_accepts_leading_zero() {
        let ticket = decode("ab:07").unwrap();
        assert_eq!(ticket.code().value(), 7);
    }

    #[rstest]
    #[case::no_separator("abc")]
    #[case::empty_handle(":12")]
    #[case::empty_code("abc:")]
    #[case::not_a_number("abc:xy")]
    #[case::signed("abc:+5")]
    #[case::negative("abc:-1")]
    #[case::too_large("abc:100")]
    #[case::huge("abc:99999999999999999999")]
    #[case::padded_handle(" abc:12")]
    #[case::control_char("a\u{7}c:12")]
    fn test_decode_rejects(#[case] raw: &str) {
        assert!(matches!(decode(raw), Err(DropError::InvalidTicket(_))));
    }

    #[test]
    fn test_verify_rejects_foreign_code() {
        let ticket = decode("ab:12").unwrap();
        assert!(matches!(
            ticket.verify(),
            Err(DropError::InvalidTicket(_))
        ));
    }

    #[test]
    fn test_display_and_from_str_agree() {
        let ticket = Ticket::for_handle("ab").unwrap();
        assert_eq!(ticket.to_string(), "ab:95");
        assert_eq!("ab:95".parse::<Ticket>().unwrap(), ticket);
    }
}

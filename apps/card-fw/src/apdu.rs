// ISO 7816-4 short-form APDU command/response and the fixed status-word
// table (`spec.md` §3, §6).
//
// No ISO 7816 parser existed in the teacher pack (`apps/vault` speaks
// CTAP HID packets, not smart-card APDUs); this module is built directly
// from `spec.md` §3/§6, in the teacher's own error-enum style
// (`apps/vault/libraries/persistent_store/src/store.rs`'s `StoreError`).

/// Short-form APDUs only (`spec.md` §4.3: "extended-length is out of
/// scope"); a command body longer than this is a length error, not a
/// truncation.
pub const MAX_SHORT_BODY_LEN: usize = 255;
pub const MAX_RESPONSE_BODY_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduError {
    WrongLength,
}

/// A parsed ISO 7816-4 command: `CLA INS P1 P2 [Lc body[Lc]] [Le]`.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub body: &'a [u8],
    pub le: Option<u8>,
}

impl<'a> Command<'a> {
    /// Parses `raw` as a short-form command. Only the header (4 bytes),
    /// header + Le (5 bytes), or header + Lc + body[Lc] + optional Le
    /// shapes are accepted; anything else is `WrongLength`.
    pub fn parse(raw: &'a [u8]) -> Result<Self, ApduError> {
        if raw.len() < 4 {
            return Err(ApduError::WrongLength);
        }
        let (cla, ins, p1, p2) = (raw[0], raw[1], raw[2], raw[3]);
        let rest = &raw[4..];

        if rest.is_empty() {
            return Ok(Command { cla, ins, p1, p2, body: &[], le: None });
        }
        if rest.len() == 1 {
            // No body, a single trailing byte is Le.
            return Ok(Command { cla, ins, p1, p2, body: &[], le: Some(rest[0]) });
        }

        let lc = rest[0] as usize;
        if lc == 0 || lc > MAX_SHORT_BODY_LEN || rest.len() < 1 + lc {
            return Err(ApduError::WrongLength);
        }
        let body = &rest[1..1 + lc];
        let remaining = &rest[1 + lc..];
        let le = match remaining.len() {
            0 => None,
            1 => Some(remaining[0]),
            _ => return Err(ApduError::WrongLength),
        };
        Ok(Command { cla, ins, p1, p2, body, le })
    }

    /// `spec.md` §4.3 rule 1: `CLA=0x00, INS=0xA4` is `SELECT FILE`.
    pub fn is_select(&self) -> bool {
        self.cla == 0x00 && self.ins == 0xA4
    }
}

/// The fixed status-word table of `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    Success,
    BytesRemaining(u8),
    /// `0x63CX`, low nibble carries the remaining retry count.
    VerifyFailed { retries: u8 },
    WrongLength,
    SecurityStatusNotSatisfied,
    AuthenticationBlocked,
    ReferencedDataInvalid,
    ConditionsNotSatisfied,
    WrongData,
    FunctionNotSupported,
    FileNotFound,
    IncorrectP1P2,
    InstructionNotSupported,
    ClassNotSupported,
    InternalError,
}

impl StatusWord {
    pub fn to_bytes(self) -> (u8, u8) {
        match self {
            StatusWord::Success => (0x90, 0x00),
            StatusWord::BytesRemaining(n) => (0x61, n),
            StatusWord::VerifyFailed { retries } => (0x63, 0xC0 | (retries & 0x0F)),
            StatusWord::WrongLength => (0x67, 0x00),
            StatusWord::SecurityStatusNotSatisfied => (0x69, 0x82),
            StatusWord::AuthenticationBlocked => (0x69, 0x83),
            StatusWord::ReferencedDataInvalid => (0x69, 0x84),
            StatusWord::ConditionsNotSatisfied => (0x69, 0x85),
            StatusWord::WrongData => (0x6A, 0x80),
            StatusWord::FunctionNotSupported => (0x6A, 0x81),
            StatusWord::FileNotFound => (0x6A, 0x82),
            StatusWord::IncorrectP1P2 => (0x6A, 0x86),
            StatusWord::InstructionNotSupported => (0x6D, 0x00),
            StatusWord::ClassNotSupported => (0x6E, 0x00),
            StatusWord::InternalError => (0x6F, 0x00),
        }
    }
}

/// An APDU response: a body of up to 256 bytes followed by SW1||SW2.
///
/// `spec.md` §4.3: "Handlers must always set SW1/SW2; the router treats
/// unset SWs as internal error." [`Response::new`] therefore starts
/// every handler call already carrying `0x6F00`.
#[derive(Debug, Clone)]
pub struct Response {
    body: Vec<u8>,
    sw1: u8,
    sw2: u8,
}

impl Default for Response {
    fn default() -> Self {
        let (sw1, sw2) = StatusWord::InternalError.to_bytes();
        Response { body: Vec::new(), sw1, sw2 }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(body: Vec<u8>) -> Self {
        let (sw1, sw2) = StatusWord::Success.to_bytes();
        Response { body, sw1, sw2 }
    }

    pub fn status(sw: StatusWord) -> Self {
        let (sw1, sw2) = sw.to_bytes();
        Response { body: Vec::new(), sw1, sw2 }
    }

    pub fn status_with_body(sw: StatusWord, body: Vec<u8>) -> Self {
        let (sw1, sw2) = sw.to_bytes();
        Response { body, sw1, sw2 }
    }

    pub fn set_status(&mut self, sw: StatusWord) {
        let (sw1, sw2) = sw.to_bytes();
        self.sw1 = sw1;
        self.sw2 = sw2;
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn sw(&self) -> (u8, u8) {
        (self.sw1, self.sw2)
    }

    pub fn is_success(&self) -> bool {
        (self.sw1, self.sw2) == StatusWord::Success.to_bytes()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_header_only_command() {
        let cmd = Command::parse(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert_eq!(cmd.ins, 0xA4);
        assert!(cmd.body.is_empty());
        assert_eq!(cmd.le, None);
    }

    #[test]
    fn parses_command_with_body() {
        let raw = [0x00, 0x20, 0x00, 0x80, 0x06, b'1', b'2', b'3', b'4', b'5', b'6'];
        let cmd = Command::parse(&raw).unwrap();
        assert_eq!(cmd.body, b"123456");
        assert_eq!(cmd.le, None);
    }

    #[test]
    fn parses_command_with_body_and_le() {
        let raw = [0x00, 0xCB, 0x3F, 0xFF, 0x03, 0x5C, 0x01, 0x7E, 0x00];
        let cmd = Command::parse(&raw).unwrap();
        assert_eq!(cmd.body, &[0x5C, 0x01, 0x7E]);
        assert_eq!(cmd.le, Some(0x00));
    }

    #[test]
    fn le_only_command_has_empty_body() {
        let cmd = Command::parse(&[0x00, 0xA4, 0x00, 0x00, 0x00]).unwrap();
        assert!(cmd.body.is_empty());
        assert_eq!(cmd.le, Some(0x00));
    }

    #[test]
    fn too_short_is_rejected() {
        assert_eq!(Command::parse(&[0x00, 0xA4, 0x00]), Err(ApduError::WrongLength));
    }

    #[test]
    fn truncated_body_is_rejected() {
        assert_eq!(
            Command::parse(&[0x00, 0x20, 0x00, 0x80, 0x06, b'1', b'2']),
            Err(ApduError::WrongLength)
        );
    }

    #[test]
    fn fresh_response_defaults_to_internal_error() {
        let response = Response::new();
        assert_eq!(response.sw(), (0x6F, 0x00));
    }

    #[test]
    fn verify_failed_encodes_retries_in_low_nibble() {
        assert_eq!(StatusWord::VerifyFailed { retries: 2 }.to_bytes(), (0x63, 0xC2));
    }
}

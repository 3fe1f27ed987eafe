// OpenPGP application (C7): OpenPGP card v3.4 subset (`spec.md` §4.5).
//
// Same PIN/retry building block as `piv.rs`, generalized to OpenPGP's
// dual user/admin PIN records. `spec.md` §4.1 only specifies ECDSA and
// ECDH on P-256; OpenPGP's SIG/AUT slots sign (`card_crypto::
// EcdsaPrivateKey`) and its DEC slot deciphers via key agreement
// (`card_crypto::EcdhPrivateKey`) rather than a bare-key decrypt that
// `spec.md` §4.1 never defines — `PSO Decipher` returns the ECDH shared
// secret the same way `EcdhPrivateKey::exchange_x_sha256` already
// produces one, rather than inventing an RSA/ECIES path the crypto layer
// doesn't implement (Design Note §9: implement correctly per the
// available primitives, or surface `not_supported`, never a
// silently-wrong path).

use card_crypto::{EcdhPrivateKey, EcdhPublicKey, EcdsaPrivateKey};
use card_store::{PinError, PinRecord};

use crate::apdu::{Command, Response, StatusWord};
use crate::hal::Env;
use crate::router::CardApplication;

/// `spec.md` §8 scenario S4's literal OpenPGP AID.
pub const OPENPGP_AID: [u8; 6] = [0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];

const USER_PIN_MAX_RETRIES: u8 = 3;
const ADMIN_PIN_MAX_RETRIES: u8 = 3;
const PIN_LEN_RANGE: core::ops::RangeInclusive<usize> = 6..=127;

const DEFAULT_USER_PIN: &[u8] = b"123456";
const DEFAULT_ADMIN_PIN: &[u8] = b"12345678";

const MAX_NAME_LEN: usize = 39;
const MAX_LANGUAGE_LEN: usize = 8;
const MAX_URL_LEN: usize = 255;

const INS_VERIFY: u8 = 0x20;
const INS_CHANGE_REFERENCE_DATA: u8 = 0x24;
const INS_GET_DATA: u8 = 0xCA;
const INS_PUT_DATA: u8 = 0xDA;
const INS_GENERATE_ASYMMETRIC: u8 = 0x47;
const INS_PSO: u8 = 0x2A;
const INS_INTERNAL_AUTHENTICATE: u8 = 0x88;
const INS_TERMINATE_DF: u8 = 0xE6;
const INS_ACTIVATE_FILE: u8 = 0x44;

const P2_USER_PIN: u8 = 0x81;
const P2_ADMIN_PIN: u8 = 0x83;

const TAG_NAME: u16 = 0x005B;
const TAG_LANGUAGE: u16 = 0x5F2D;
const TAG_SEX: u16 = 0x5F35;
const TAG_URL: u16 = 0x5F50;
const TAG_AID: u16 = 0x004F;
const TAG_KEY_INFO: u16 = 0x00DE;
const TAG_KEY_ATTR_SIG: u16 = 0x00C1;
const TAG_KEY_ATTR_DEC: u16 = 0x00C2;
const TAG_KEY_ATTR_AUT: u16 = 0x00C3;
const TAG_PW_STATUS: u16 = 0x00C4;
const TAG_FINGERPRINT_SIG: u16 = 0x00C7;
const TAG_FINGERPRINT_DEC: u16 = 0x00C8;
const TAG_FINGERPRINT_AUT: u16 = 0x00C9;

/// OpenPGP card algorithm IDs (RFC 4880bis registry) for the ECDSA/ECDH
/// attributes reported under `0x00C1..0x00C3`.
const ALG_ID_ECDH: u8 = 0x12;
const ALG_ID_ECDSA: u8 = 0x13;
/// DER-encoded OID body (no tag/length octets) for NIST P-256,
/// `1.2.840.10045.3.1.7`, as the key-attributes DO embeds it.
const P256_OID: [u8; 8] = [0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const FINGERPRINT_LEN: usize = 20;
const MAX_PIN_LEN_REPORTED: u8 = 127;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Sig,
    Dec,
    Aut,
}

enum SlotKey {
    None,
    Signing(EcdsaPrivateKey),
    Agreement(EcdhPrivateKey),
}

struct KeySlot {
    kind: SlotKind,
    key: SlotKey,
}

impl KeySlot {
    fn new(kind: SlotKind) -> Self {
        KeySlot { kind, key: SlotKey::None }
    }

    fn generated(&self) -> bool {
        !matches!(self.key, SlotKey::None)
    }
}

#[derive(Clone)]
struct CardholderData {
    name: Vec<u8>,
    language: Vec<u8>,
    sex: u8,
    url: Vec<u8>,
}

impl Default for CardholderData {
    fn default() -> Self {
        CardholderData { name: Vec::new(), language: Vec::new(), sex: 0x39, url: Vec::new() }
    }
}

/// The OpenPGP card application, per `spec.md` §4.5.
pub struct OpenPgp {
    user_pin: PinRecord,
    user_verified: bool,
    admin_pin: PinRecord,
    admin_verified: bool,
    cardholder: CardholderData,
    sig_counter: u32,
    terminated: bool,
    slots: [KeySlot; 3],
}

impl Default for OpenPgp {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenPgp {
    pub fn new() -> Self {
        let mut user_pin = PinRecord::unset(USER_PIN_MAX_RETRIES);
        user_pin.set(DEFAULT_USER_PIN);
        let mut admin_pin = PinRecord::unset(ADMIN_PIN_MAX_RETRIES);
        admin_pin.set(DEFAULT_ADMIN_PIN);
        OpenPgp {
            user_pin,
            user_verified: false,
            admin_pin,
            admin_verified: false,
            cardholder: CardholderData::default(),
            sig_counter: 0,
            terminated: false,
            slots: [KeySlot::new(SlotKind::Sig), KeySlot::new(SlotKind::Dec), KeySlot::new(SlotKind::Aut)],
        }
    }

    fn handle_verify(&mut self, command: &Command) -> Response {
        let (pin, verified): (&mut PinRecord, &mut bool) = match command.p2 {
            P2_USER_PIN => (&mut self.user_pin, &mut self.user_verified),
            P2_ADMIN_PIN => (&mut self.admin_pin, &mut self.admin_verified),
            _ => return Response::status(StatusWord::IncorrectP1P2),
        };

        if command.body.is_empty() {
            return if *verified {
                Response::status(StatusWord::Success)
            } else {
                Response::status(StatusWord::VerifyFailed { retries: pin.retries_remaining() })
            };
        }
        if !PIN_LEN_RANGE.contains(&command.body.len()) {
            return Response::status(StatusWord::WrongLength);
        }

        match pin.verify(command.body) {
            Ok(()) => {
                *verified = true;
                Response::status(StatusWord::Success)
            }
            Err(PinError::Blocked) => Response::status(StatusWord::AuthenticationBlocked),
            Err(PinError::Mismatch) => {
                *verified = false;
                Response::status(StatusWord::VerifyFailed { retries: pin.retries_remaining() })
            }
            Err(PinError::NotSet) | Err(PinError::InvalidLength) => Response::status(StatusWord::InternalError),
        }
    }

    fn handle_change_reference_data(&mut self, command: &Command) -> Response {
        let (pin, verified): (&mut PinRecord, &mut bool) = match command.p2 {
            P2_USER_PIN => (&mut self.user_pin, &mut self.user_verified),
            P2_ADMIN_PIN => (&mut self.admin_pin, &mut self.admin_verified),
            _ => return Response::status(StatusWord::IncorrectP1P2),
        };

        let body = command.body;
        if body.len() < 12 || body.len() % 2 != 0 {
            return Response::status(StatusWord::WrongLength);
        }
        let half = body.len() / 2;
        let (old_pin, new_pin) = body.split_at(half);

        match pin.verify(old_pin) {
            Ok(()) => {
                pin.set(new_pin);
                *verified = true;
                Response::status(StatusWord::Success)
            }
            Err(PinError::Blocked) => Response::status(StatusWord::AuthenticationBlocked),
            Err(PinError::Mismatch) => {
                *verified = false;
                Response::status(StatusWord::VerifyFailed { retries: pin.retries_remaining() })
            }
            Err(PinError::NotSet) | Err(PinError::InvalidLength) => Response::status(StatusWord::InternalError),
        }
    }

    fn tag(command: &Command) -> u16 {
        u16::from_be_bytes([command.p1, command.p2])
    }

    /// `0x00C1/C2/C3`, `spec.md` §6: algorithm attributes per key slot,
    /// the algorithm ID followed by the curve OID for the slot's kind.
    fn key_attributes(&self, index: usize) -> Vec<u8> {
        let alg = match self.slots[index].kind {
            SlotKind::Dec => ALG_ID_ECDH,
            SlotKind::Sig | SlotKind::Aut => ALG_ID_ECDSA,
        };
        let mut attrs = vec![alg];
        attrs.extend_from_slice(&P256_OID);
        attrs
    }

    /// `0x00C7/C8/C9`, `spec.md` §6: per-slot key fingerprint. A slot
    /// with no generated key reports all-zero bytes, matching the
    /// "absent" encoding the OpenPGP card spec uses for this DO.
    fn fingerprint(&self, index: usize) -> Vec<u8> {
        let public = match &self.slots[index].key {
            SlotKey::None => return vec![0u8; FINGERPRINT_LEN],
            SlotKey::Signing(key) => key.public_key().to_xy_bytes().to_vec(),
            SlotKey::Agreement(key) => key.public_key().to_xy_bytes().to_vec(),
        };
        card_crypto::sha256(&public)[..FINGERPRINT_LEN].to_vec()
    }

    /// `0x00C4`, `spec.md` §6: PIN-status, PW1/PW3 validity and the
    /// retry counters `PinRecord` already tracks. No reset-code PIN is
    /// implemented, so its max-length and retry fields report zero.
    fn pw_status(&self) -> Vec<u8> {
        vec![
            self.user_verified as u8,
            MAX_PIN_LEN_REPORTED,
            0,
            MAX_PIN_LEN_REPORTED,
            self.user_pin.retries_remaining(),
            0,
            self.admin_pin.retries_remaining(),
        ]
    }

    fn handle_get_data(&self, command: &Command) -> Response {
        match Self::tag(command) {
            TAG_NAME => Response::ok(self.cardholder.name.clone()),
            TAG_LANGUAGE => Response::ok(self.cardholder.language.clone()),
            TAG_SEX => Response::ok(vec![self.cardholder.sex]),
            TAG_URL => Response::ok(self.cardholder.url.clone()),
            TAG_AID => Response::ok(OPENPGP_AID.to_vec()),
            TAG_KEY_INFO => {
                let info: Vec<u8> = self.slots.iter().map(|slot| slot.generated() as u8).collect();
                Response::ok(info)
            }
            TAG_KEY_ATTR_SIG => Response::ok(self.key_attributes(0)),
            TAG_KEY_ATTR_DEC => Response::ok(self.key_attributes(1)),
            TAG_KEY_ATTR_AUT => Response::ok(self.key_attributes(2)),
            TAG_PW_STATUS => Response::ok(self.pw_status()),
            TAG_FINGERPRINT_SIG => Response::ok(self.fingerprint(0)),
            TAG_FINGERPRINT_DEC => Response::ok(self.fingerprint(1)),
            TAG_FINGERPRINT_AUT => Response::ok(self.fingerprint(2)),
            _ => Response::status(StatusWord::FileNotFound),
        }
    }

    fn handle_put_data(&mut self, command: &Command) -> Response {
        if !self.admin_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        match Self::tag(command) {
            TAG_NAME if command.body.len() <= MAX_NAME_LEN => {
                self.cardholder.name = command.body.to_vec();
                Response::status(StatusWord::Success)
            }
            TAG_LANGUAGE if command.body.len() <= MAX_LANGUAGE_LEN => {
                self.cardholder.language = command.body.to_vec();
                Response::status(StatusWord::Success)
            }
            TAG_SEX if command.body.len() == 1 => {
                self.cardholder.sex = command.body[0];
                Response::status(StatusWord::Success)
            }
            TAG_URL if command.body.len() <= MAX_URL_LEN => {
                self.cardholder.url = command.body.to_vec();
                Response::status(StatusWord::Success)
            }
            TAG_NAME | TAG_LANGUAGE | TAG_SEX | TAG_URL => Response::status(StatusWord::WrongData),
            _ => Response::status(StatusWord::FileNotFound),
        }
    }

    fn slot_index(p2: u8) -> Option<usize> {
        match p2 {
            0x00 => Some(0), // SIG
            0x01 => Some(1), // DEC
            0x02 => Some(2), // AUT
            _ => None,
        }
    }

    fn handle_generate<E: Env>(&mut self, env: &mut E, command: &Command) -> Response {
        if !self.admin_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        let index = match Self::slot_index(command.p2) {
            Some(index) => index,
            None => return Response::status(StatusWord::IncorrectP1P2),
        };

        let public = match self.slots[index].kind {
            SlotKind::Dec => {
                let key = EcdhPrivateKey::generate(env.rng());
                let public = key.public_key().to_xy_bytes();
                self.slots[index].key = SlotKey::Agreement(key);
                public
            }
            SlotKind::Sig | SlotKind::Aut => {
                let key = EcdsaPrivateKey::generate(env.rng());
                let public = key.public_key().to_xy_bytes();
                self.slots[index].key = SlotKey::Signing(key);
                public
            }
        };
        Response::ok(public.to_vec())
    }

    fn handle_pso(&mut self, command: &Command) -> Response {
        match (command.p1, command.p2) {
            // Compute Digital Signature.
            (0x9E, 0x9A) => {
                if !self.user_verified {
                    return Response::status(StatusWord::SecurityStatusNotSatisfied);
                }
                let digest: [u8; 32] = match command.body.try_into() {
                    Ok(digest) => digest,
                    Err(_) => return Response::status(StatusWord::WrongData),
                };
                match &self.slots[0].key {
                    SlotKey::Signing(key) => {
                        let signature = key.sign_deterministic(&digest);
                        self.sig_counter = self.sig_counter.wrapping_add(1);
                        Response::ok(signature.to_bytes().to_vec())
                    }
                    _ => Response::status(StatusWord::ReferencedDataInvalid),
                }
            }
            // Decipher.
            (0x80, 0x86) => {
                if !self.user_verified {
                    return Response::status(StatusWord::SecurityStatusNotSatisfied);
                }
                let peer = match EcdhPublicKey::from_uncompressed(command.body) {
                    Ok(peer) => peer,
                    Err(_) => return Response::status(StatusWord::WrongData),
                };
                match &self.slots[1].key {
                    SlotKey::Agreement(key) => {
                        let shared = key.exchange_x_sha256(&peer);
                        Response::ok(shared.to_vec())
                    }
                    _ => Response::status(StatusWord::ReferencedDataInvalid),
                }
            }
            _ => Response::status(StatusWord::IncorrectP1P2),
        }
    }

    fn handle_internal_authenticate(&mut self, command: &Command) -> Response {
        if !self.user_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        let digest: [u8; 32] = match command.body.try_into() {
            Ok(digest) => digest,
            Err(_) => return Response::status(StatusWord::WrongData),
        };
        match &self.slots[2].key {
            SlotKey::Signing(key) => Response::ok(key.sign_deterministic(&digest).to_bytes().to_vec()),
            _ => Response::status(StatusWord::ReferencedDataInvalid),
        }
    }

    fn handle_terminate(&mut self) -> Response {
        if !self.admin_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        self.terminated = true;
        Response::status(StatusWord::Success)
    }

    fn handle_activate<E: Env>(&mut self, env: &mut E) -> Response {
        self.reset(env);
        Response::status(StatusWord::Success)
    }
}

impl<E: Env> CardApplication<E> for OpenPgp {
    fn aid(&self) -> &[u8] {
        &OPENPGP_AID
    }

    fn select(&mut self, _env: &mut E) -> Vec<u8> {
        vec![0x6F, 0x00]
    }

    fn handle(&mut self, env: &mut E, command: &Command) -> Response {
        if self.terminated && command.ins != INS_ACTIVATE_FILE {
            return Response::status(StatusWord::ConditionsNotSatisfied);
        }
        match command.ins {
            INS_VERIFY => self.handle_verify(command),
            INS_CHANGE_REFERENCE_DATA => self.handle_change_reference_data(command),
            INS_GET_DATA => self.handle_get_data(command),
            INS_PUT_DATA => self.handle_put_data(command),
            INS_GENERATE_ASYMMETRIC => self.handle_generate(env, command),
            INS_PSO => self.handle_pso(command),
            INS_INTERNAL_AUTHENTICATE => self.handle_internal_authenticate(command),
            INS_TERMINATE_DF => self.handle_terminate(),
            INS_ACTIVATE_FILE => self.handle_activate(env),
            _ => Response::status(StatusWord::InstructionNotSupported),
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn reset(&mut self, _env: &mut E) {
        *self = OpenPgp::new();
    }
}

// Management application (C8): device info and USB-interface enable mask
// (`spec.md` §4.6).
//
// No teacher precedent exists for a management applet (`apps/vault`
// doesn't expose one); the TLV tag layout and instruction codes are
// grounded on Yubico's published YubiKey Manager protocol (GET/SET
// DEVICE INFO, `0x1D`/`0x1C`) rather than invented, since `spec.md`
// leaves the wire instruction codes unspecified while fixing the TLV
// tag numbers themselves.

use crate::apdu::{Command, Response, StatusWord};
use crate::hal::Env;
use crate::router::CardApplication;

pub const MGMT_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x05, 0x27, 0x47, 0x11, 0x17];

const INS_GET_DEVICE_INFO: u8 = 0x1D;
const INS_SET_DEVICE_INFO: u8 = 0x1C;

const TAG_CAPABILITIES: u8 = 0x01;
const TAG_SERIAL: u8 = 0x02;
const TAG_VERSION: u8 = 0x03;
const TAG_FORM_FACTOR: u8 = 0x04;
const TAG_SUPPORTED_USB_MASK: u8 = 0x05;
const TAG_ENABLED_USB_MASK: u8 = 0x06;

/// `spec.md` §4.6's device-info record.
pub struct DeviceInfo {
    pub capabilities: u16,
    pub serial: u32,
    pub version: (u8, u8, u8),
    pub form_factor: u8,
    pub supported_usb_mask: u8,
    pub enabled_usb_mask: u8,
}

impl DeviceInfo {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.push(TAG_CAPABILITIES);
        out.push(2);
        out.extend_from_slice(&self.capabilities.to_be_bytes());
        out.push(TAG_SERIAL);
        out.push(4);
        out.extend_from_slice(&self.serial.to_be_bytes());
        out.push(TAG_VERSION);
        out.push(3);
        out.extend_from_slice(&[self.version.0, self.version.1, self.version.2]);
        out.push(TAG_FORM_FACTOR);
        out.push(1);
        out.push(self.form_factor);
        out.push(TAG_SUPPORTED_USB_MASK);
        out.push(1);
        out.push(self.supported_usb_mask);
        out.push(TAG_ENABLED_USB_MASK);
        out.push(1);
        out.push(self.enabled_usb_mask);
        out
    }
}

/// The management application, per `spec.md` §4.6.
pub struct Management {
    info: DeviceInfo,
}

impl Default for Management {
    fn default() -> Self {
        Self::new()
    }
}

impl Management {
    pub fn new() -> Self {
        Management {
            info: DeviceInfo {
                capabilities: 0x0000,
                serial: 0,
                version: (1, 0, 0),
                form_factor: 0x00,
                supported_usb_mask: 0b0000_0111,
                enabled_usb_mask: 0b0000_0111,
            },
        }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn handle_get_device_info(&self) -> Response {
        Response::ok(self.info.encode())
    }

    fn handle_set_device_info(&mut self, command: &Command) -> Response {
        let mut remaining = command.body;
        while let [tag, len, rest @ ..] = remaining {
            let len = *len as usize;
            if rest.len() < len {
                return Response::status(StatusWord::WrongLength);
            }
            let value = &rest[..len];
            if *tag == TAG_ENABLED_USB_MASK {
                if value.len() != 1 {
                    return Response::status(StatusWord::WrongLength);
                }
                let new_mask = value[0];
                if new_mask & !self.info.supported_usb_mask != 0 {
                    return Response::status(StatusWord::WrongData);
                }
                self.info.enabled_usb_mask = new_mask;
            }
            remaining = &rest[len..];
        }
        Response::status(StatusWord::Success)
    }
}

impl<E: Env> CardApplication<E> for Management {
    fn aid(&self) -> &[u8] {
        &MGMT_AID
    }

    fn select(&mut self, _env: &mut E) -> Vec<u8> {
        vec![0x6F, 0x00]
    }

    fn handle(&mut self, _env: &mut E, command: &Command) -> Response {
        match command.ins {
            INS_GET_DEVICE_INFO => self.handle_get_device_info(),
            INS_SET_DEVICE_INFO => self.handle_set_device_info(command),
            _ => Response::status(StatusWord::InstructionNotSupported),
        }
    }

    fn reset(&mut self, _env: &mut E) {
        *self = Management::new();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use card_crypto::Drbg;
    use card_store::flash::MemoryFlash;

    struct TestEnv {
        flash: MemoryFlash,
        rng: Drbg,
    }

    impl Env for TestEnv {
        type Rng = Drbg;
        fn flash(&mut self) -> &mut dyn card_store::Flash {
            &mut self.flash
        }
        fn rng(&mut self) -> &mut Drbg {
            &mut self.rng
        }
        fn button_get_state(&self) -> bool {
            false
        }
        fn button_wait_press(&mut self, _timeout_ms: u32) -> bool {
            false
        }
        fn led_set_state(&mut self, _state: bool) {}
        fn get_time_ms(&self) -> u64 {
            0
        }
        fn watchdog_feed(&mut self) {}
    }

    fn env() -> TestEnv {
        TestEnv {
            flash: MemoryFlash::new(65536),
            rng: Drbg::instantiate(b"mgmt-test-entropy-pool-32bytes!!", b""),
        }
    }

    #[test]
    fn get_device_info_reports_the_supported_usb_mask() {
        let mgmt = Management::new();
        let get = Command { cla: 0x00, ins: INS_GET_DEVICE_INFO, p1: 0x00, p2: 0x00, body: &[], le: None };
        let response = CardApplication::<TestEnv>::handle(&mut Management::new(), &mut env(), &get);
        assert!(response.is_success());
        assert_eq!(response.body(), mgmt.info.encode());
    }

    #[test]
    fn enabling_an_unsupported_usb_interface_is_rejected() {
        let mut mgmt = Management::new();
        let body = vec![TAG_ENABLED_USB_MASK, 1, 0b1000_0000];
        let set = Command { cla: 0x00, ins: INS_SET_DEVICE_INFO, p1: 0x00, p2: 0x00, body: &body, le: None };
        let response = CardApplication::<TestEnv>::handle(&mut mgmt, &mut env(), &set);
        assert_eq!(response.sw(), StatusWord::WrongData.to_bytes());
        assert_eq!(mgmt.info.enabled_usb_mask, 0b0000_0111);
    }

    #[test]
    fn enabling_a_supported_subset_is_persisted() {
        let mut mgmt = Management::new();
        let body = vec![TAG_ENABLED_USB_MASK, 1, 0b0000_0010];
        let set = Command { cla: 0x00, ins: INS_SET_DEVICE_INFO, p1: 0x00, p2: 0x00, body: &body, le: None };
        let response = CardApplication::<TestEnv>::handle(&mut mgmt, &mut env(), &set);
        assert!(response.is_success());
        assert_eq!(mgmt.info.enabled_usb_mask, 0b0000_0010);
    }
}

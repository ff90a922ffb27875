//! Onboarding payload for commissioning.
//!
//! The 11-digit manual pairing code is what users type into a controller app
//! when the QR code can't be scanned.

use std::fmt;

use crate::config::MatterConfig;

/// Commissioning details shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub discriminator: u16,
    pub passcode: u32,
    pub manual_code: String,
}

impl OnboardingInfo {
    pub fn from_config(config: &MatterConfig) -> Self {
        Self {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            discriminator: config.discriminator,
            passcode: config.passcode,
            manual_code: generate_pairing_code(config.discriminator, config.passcode),
        }
    }

    /// Manual code grouped as `XXXX-XXX-XXXX`.
    pub fn formatted_code(&self) -> String {
        let code = &self.manual_code;
        format!("{}-{}-{}", &code[..4], &code[4..7], &code[7..])
    }
}

impl fmt::Display for OnboardingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Manual pairing code: {}", self.formatted_code())?;
        writeln!(f, "Discriminator: {}", self.discriminator)?;
        writeln!(f, "Passcode: {}", self.passcode)?;
        write!(
            f,
            "Vendor/Product: 0x{:04X}/0x{:04X}",
            self.vendor_id, self.product_id
        )
    }
}

/// Generate the manual pairing code from discriminator and passcode.
///
/// Only the top four bits of the 12-bit discriminator are encoded.
pub fn generate_pairing_code(discriminator: u16, passcode: u32) -> String {
    // Discriminator bits 11-10
    let chunk1 = (discriminator >> 10) & 0x03;
    // Discriminator bits 9-8 above passcode bits 13-0
    let chunk2 = ((((discriminator >> 8) & 0x03) as u32) << 14) | (passcode & 0x3FFF);
    // Passcode bits 26-14
    let chunk3 = (passcode >> 14) & 0x1FFF;

    let payload = format!("{}{:05}{:04}", chunk1, chunk2, chunk3);
    let check = verhoeff_check_digit(&payload);
    format!("{}{}", payload, check)
}

const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const VERHOEFF_INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

/// Verhoeff check digit of a string of ASCII decimal digits.
fn verhoeff_check_digit(digits: &str) -> u8 {
    let c = digits
        .bytes()
        .rev()
        .map(|b| (b - b'0') as usize)
        .enumerate()
        .fold(0usize, |c, (i, d)| {
            VERHOEFF_D[c][VERHOEFF_P[(i + 1) % 8][d] as usize] as usize
        });
    VERHOEFF_INV[c]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_test_vector() {
        assert_eq!(generate_pairing_code(3840, 20202021), "34970112332");
    }

    #[test]
    fn test_code_is_eleven_digits() {
        for (discriminator, passcode) in [(0, 1), (4095, 99999998), (1234, 12345678)] {
            let code = generate_pairing_code(discriminator, passcode);
            assert_eq!(code.len(), 11);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_check_digit_detects_single_digit_error() {
        let code = generate_pairing_code(3840, 20202021);
        let (payload, check) = code.split_at(10);
        let mut altered = payload.as_bytes().to_vec();
        altered[3] = if altered[3] == b'9' { b'0' } else { altered[3] + 1 };
        let altered = String::from_utf8(altered).unwrap();
        assert_ne!(verhoeff_check_digit(&altered).to_string(), check);
    }

    #[test]
    fn test_onboarding_info() {
        let info = OnboardingInfo::from_config(&Config::default().matter);
        assert_eq!(info.formatted_code(), "3497-011-2332");
        let text = info.to_string();
        assert!(text.contains("3497-011-2332"));
        assert!(text.contains("0xFFF1/0x8000"));
    }
}

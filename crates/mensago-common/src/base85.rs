//! Base85 encoding (RFC 1924 alphabet)
//!
//! All binary data in CryptoStrings, keycards, and encrypted payloads is
//! carried in this encoding.

use crate::error::{MensagoError, Result};

const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

const fn build_decode_table() -> [u8; 256] {
    let mut table = [0xFFu8; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static DECODE: [u8; 256] = build_decode_table();

/// Encodes bytes into a Base85 string
pub fn encode(data: &[u8]) -> String {
    let padding = (4 - data.len() % 4) % 4;
    let mut out = Vec::with_capacity((data.len() + padding) / 4 * 5);

    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        out.extend_from_slice(&digits);
    }

    out.truncate(out.len() - padding);
    // The alphabet is pure ASCII
    out.into_iter().map(char::from).collect()
}

/// Decodes a Base85 string into bytes
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let padding = (5 - bytes.len() % 5) % 5;
    let mut out = Vec::with_capacity((bytes.len() + padding) / 5 * 4);

    for (index, chunk) in bytes.chunks(5).enumerate() {
        let mut value: u64 = 0;
        for i in 0..5 {
            let c = chunk.get(i).copied().unwrap_or(b'~');
            let digit = DECODE[c as usize];
            if digit == 0xFF {
                return Err(MensagoError::BadData(format!(
                    "bad base85 character at position {}",
                    index * 5 + i
                )));
            }
            value = value * 85 + u64::from(digit);
        }
        if value > u64::from(u32::MAX) {
            return Err(MensagoError::BadData(format!(
                "base85 overflow in chunk starting at position {}",
                index * 5
            )));
        }
        out.extend_from_slice(&(value as u32).to_be_bytes());
    }

    out.truncate(out.len() - padding);
    Ok(out)
}

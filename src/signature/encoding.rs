//! Printable base-32 form used for public keys and pool tags
//!
//! Bits are consumed least-significant first, five at a time, and mapped
//! through the z-base-32 alphabet. A 32-byte key encodes to 52 characters.

const ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

const INVALID: u8 = 0xff;

const fn decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        // Accept upper case too
        table[ALPHABET[i].to_ascii_uppercase() as usize] = i as u8;
        i += 1;
    }
    table
}

static DECODE: [u8; 256] = decode_table();

/// Encode bytes into the printable base-32 form
pub fn encode(input: &[u8]) -> String {
    let mut out = String::with_capacity((input.len() * 8).div_ceil(5));
    let mut acc: u32 = 0;
    let mut bits = 0;

    for &byte in input {
        acc |= (byte as u32) << bits;
        bits += 8;
        while bits >= 5 {
            out.push(ALPHABET[(acc & 0x1f) as usize] as char);
            acc >>= 5;
            bits -= 5;
        }
    }

    if bits > 0 {
        out.push(ALPHABET[(acc & 0x1f) as usize] as char);
    }

    out
}

/// Decode the printable base-32 form
///
/// Returns `None` on characters outside the alphabet. Trailing bits that do
/// not complete a byte are dropped.
pub fn decode(input: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits = 0;

    for &c in input {
        let value = DECODE[c as usize];
        if value == INVALID {
            return None;
        }
        acc |= (value as u32) << bits;
        bits += 5;
        if bits >= 8 {
            out.push((acc & 0xff) as u8);
            acc >>= 8;
            bits -= 8;
        }
    }

    Some(out)
}

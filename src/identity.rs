//! Symbol identity: a stable 64-bit fingerprint of a mangled declaration
//! descriptor, produced by `hash_usr`.

use crate::types::Usr;

/// The fixed 128-bit SipHash-2-4 key. Constant across versions so that a
/// `Usr` computed by one build of the Analyzer matches one computed by
/// another, and so cache files remain valid across process restarts.
const KEY0: u64 = 0x6c62_2727_2f65_7865;
const KEY1: u64 = 0x6c79_6d70_6869_6164;

/// SipHash-2-4 of `mangled` with the fixed key. Deterministic; two
/// distinct mangled strings collide only with cryptographic probability.
pub fn hash_usr(mangled: &[u8]) -> Usr {
    Usr(sip_hash_2_4(KEY0, KEY1, mangled))
}

fn sip_hash_2_4(key0: u64, key1: u64, data: &[u8]) -> u64 {
    let mut v0: u64 = 0x736f_6d65_7073_6575 ^ key0;
    let mut v1: u64 = 0x646f_7261_6e64_6f6d ^ key1;
    let mut v2: u64 = 0x6c79_6765_6e65_7261 ^ key0;
    let mut v3: u64 = 0x7465_6462_7974_6573 ^ key1;

    let len = data.len();
    let end = len - (len % 8);
    let mut i = 0;
    while i < end {
        let m = u64::from_le_bytes(data[i..i + 8].try_into().unwrap());
        v3 ^= m;
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
        v0 ^= m;
        i += 8;
    }

    let mut last_block = [0u8; 8];
    last_block[..len - end].copy_from_slice(&data[end..]);
    last_block[7] = (len & 0xff) as u8;
    let m = u64::from_le_bytes(last_block);
    v3 ^= m;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    v0 ^= m;

    v2 ^= 0xff;
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);
    sip_round(&mut v0, &mut v1, &mut v2, &mut v3);

    v0 ^ v1 ^ v2 ^ v3
}

#[inline]
fn sip_round(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);
    *v2 = v2.wrapping_add(*v3);
    *v3 = v3.rotate_left(16);
    *v3 ^= *v2;
    *v0 = v0.wrapping_add(*v3);
    *v3 = v3.rotate_left(21);
    *v3 ^= *v0;
    *v2 = v2.wrapping_add(*v1);
    *v1 = v1.rotate_left(17);
    *v1 ^= *v2;
    *v2 = v2.rotate_left(32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = hash_usr(b"c:@F@foo#");
        let b = hash_usr(b"c:@F@foo#");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_inputs_differ() {
        let a = hash_usr(b"c:@F@foo#");
        let b = hash_usr(b"c:@F@bar#");
        assert_ne!(a, b);
    }

    #[test]
    fn handles_empty_and_odd_lengths() {
        let _ = hash_usr(b"");
        let _ = hash_usr(b"1");
        let _ = hash_usr(b"1234567");
        let _ = hash_usr(b"12345678");
        let _ = hash_usr(b"123456789");
    }
}

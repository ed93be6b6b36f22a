//! Fletcher-16 running checksum as used by the Microlink wire format.
//!
//! Every message ends in two check bytes derived from the Fletcher sums of all
//! preceding bytes: `trailer = (cb0 << 8) | cb1`, big-endian on the wire. The
//! modulus is 255 (not 256), so a sum of exactly 255 wraps to zero.

/// Incremental Fletcher-16 over a byte stream.
#[derive(Debug, Default)]
pub struct Fletcher16 {
    c0: u32,
    c1: u32,
}

impl Fletcher16 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes into the running sums.
    pub fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.c0 = (self.c0 + u32::from(b)) % 255;
            self.c1 = (self.c1 + self.c0) % 255;
        }
    }

    /// Current running sums `(c0, c1)`.
    pub fn sums(&self) -> (u8, u8) {
        (self.c0 as u8, self.c1 as u8)
    }

    /// Check bytes `(cb0, cb1)` for the data seen so far. Appending these to
    /// the stream drives both running sums to zero.
    pub fn check_bytes(&self) -> (u8, u8) {
        let cb0 = 255 - ((self.c0 + self.c1) % 255);
        let cb1 = 255 - ((self.c0 + cb0) % 255);
        (cb0 as u8, cb1 as u8)
    }
}

/// Check-byte trailer for `data`, in the order it appears on the wire.
pub fn message_trailer(data: &[u8]) -> u16 {
    let mut f = Fletcher16::new();
    f.update(data);
    let (cb0, cb1) = f.check_bytes();
    (u16::from(cb0) << 8) | u16::from(cb1)
}

/// Validate a whole message: the last two bytes must be the check-byte
/// trailer of everything before them. Messages shorter than the trailer
/// itself can never verify.
pub fn verify(raw: &[u8]) -> bool {
    if raw.len() < 3 {
        return false;
    }
    let (body, trailer) = raw.split_at(raw.len() - 2);
    let stored = (u16::from(trailer[0]) << 8) | u16::from(trailer[1]);
    message_trailer(body) == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_abcde_vector() {
        // Fletcher16("abcde") = 0xC8F0: c0 = 0xF0, c1 = 0xC8
        let mut f = Fletcher16::new();
        f.update(b"abcde");
        assert_eq!(f.sums(), (0xF0, 0xC8));
        assert_eq!(f.check_bytes(), (70, 200));
    }

    #[test]
    fn trailer_round_trip() {
        let body = [0x6F, 0x01, 0x02, 0x03];
        let trailer = message_trailer(&body);
        let mut msg = body.to_vec();
        msg.extend_from_slice(&trailer.to_be_bytes());
        assert!(verify(&msg));
    }

    #[test]
    fn verify_rejects_corruption() {
        let body = b"some message body";
        let trailer = message_trailer(body);
        let mut msg = body.to_vec();
        msg.extend_from_slice(&trailer.to_be_bytes());
        msg[3] ^= 0x01;
        assert!(!verify(&msg));
    }

    #[test]
    fn verify_rejects_short_input() {
        assert!(!verify(&[]));
        assert!(!verify(&[0xAB, 0xCD]));
    }

    #[test]
    fn incremental_update_matches_one_shot() {
        let mut a = Fletcher16::new();
        a.update(b"hello ");
        a.update(b"world");
        let mut b = Fletcher16::new();
        b.update(b"hello world");
        assert_eq!(a.check_bytes(), b.check_bytes());
    }
}

//! CRC-32 of the uncompressed data.
//!
//! Every decoded byte runs through this checksum; the finalised value is
//! stored in (and checked against) the member trailer. The polynomial is
//! the IEEE one (reflected 0xEDB88320), initial value 0xFFFFFFFF, final
//! XOR 0xFFFFFFFF, so the CRC of the empty string is zero.

/// Running CRC-32 over the uncompressed data of one member.
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn update_byte(&mut self, byte: u8) {
        self.hasher.update(&[byte]);
    }

    /// Current value; the hasher keeps running.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// One-shot CRC of a slice.
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Crc32::new();
        crc.update(data);
        crc.value()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crc32({:08X})", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(Crc32::compute(b""), 0);
        assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
        assert_eq!(
            Crc32::compute(b"The quick brown fox jumps over the lazy dog"),
            0x414FA339
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"The quick brown fox jumps over the lazy dog.\n";
        let mut crc = Crc32::new();
        for chunk in data.chunks(7) {
            crc.update(chunk);
        }
        assert_eq!(crc.value(), Crc32::compute(data));

        crc.reset();
        for &b in data.iter() {
            crc.update_byte(b);
        }
        assert_eq!(crc.value(), Crc32::compute(data));
    }
}

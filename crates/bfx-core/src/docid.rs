/// A 32-bit document identifier, assigned monotonically starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(pub u32);

impl DocId {
    pub const FIRST: DocId = DocId(1);

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        DocId(u32::from_be_bytes(bytes))
    }

    /// Read a doc id from the first 4 bytes of a posting value.
    ///
    /// Returns `None` if `bytes` is shorter than 4 bytes (a corrupt posting).
    pub fn read_prefix(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
        Some(Self::from_be_bytes(arr))
    }

    pub fn next(self) -> Self {
        DocId(self.0 + 1)
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Actor ID — a cheap, ordered identifier minted per simulation context.

/// Identity of one actor incarnation.
///
/// Names are what actors use to address each other; the ID only tells
/// two incarnations registered under the same name apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorId(u64);

impl ActorId {
    /// Create an actor ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        ActorId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<A{}>", self.0)
    }
}

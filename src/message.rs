//! Dynamic message values exchanged between actors.

use std::fmt;

/// An opaque message carried between actors.
///
/// Handlers match on messages by exact value, so every variant is
/// comparable. `Atom` is the everyday tag (`"data"`, `"tick"`); `Tuple`
/// lets callers build tagged payloads such as `("job", 7)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// A symbolic tag.
    Atom(String),
    /// Human-readable text.
    Text(String),
    /// A signed integer.
    Int(i64),
    /// Raw bytes.
    Data(Vec<u8>),
    /// An ordered group of values.
    Tuple(Vec<Message>),
    /// No payload at all (acks, heartbeats).
    Empty,
}

impl Message {
    /// Build an [`Message::Atom`].
    pub fn atom(tag: impl Into<String>) -> Self {
        Message::Atom(tag.into())
    }

    /// Build a [`Message::Text`].
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    /// Build a [`Message::Tuple`] from anything convertible to messages.
    pub fn tuple<I, M>(items: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Message>,
    {
        Message::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if this is the atom `tag`.
    pub fn is_atom(&self, tag: &str) -> bool {
        matches!(self, Message::Atom(a) if a == tag)
    }

    /// The leading atom of a tagged tuple, or the atom itself.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Message::Atom(a) => Some(a),
            Message::Tuple(items) => match items.first() {
                Some(Message::Atom(a)) => Some(a),
                _ => None,
            },
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Message::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Stable byte encoding used for trace digests.
    pub(crate) fn digest_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Message::Atom(s) => {
                out.push(0);
                out.extend_from_slice(s.as_bytes());
            }
            Message::Text(s) => {
                out.push(1);
                out.extend_from_slice(s.as_bytes());
            }
            Message::Int(n) => {
                out.push(2);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Message::Data(d) => {
                out.push(3);
                out.extend_from_slice(d);
            }
            Message::Tuple(items) => {
                out.push(4);
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.digest_bytes(out);
                }
            }
            Message::Empty => out.push(5),
        }
    }
}

impl From<&str> for Message {
    fn from(tag: &str) -> Self {
        Message::Atom(tag.to_string())
    }
}

impl From<i64> for Message {
    fn from(n: i64) -> Self {
        Message::Int(n)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Data(data)
    }
}

impl From<()> for Message {
    fn from(_: ()) -> Self {
        Message::Empty
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Atom(a) => write!(f, ":{}", a),
            Message::Text(s) => {
                if s.chars().count() > 32 {
                    let head: String = s.chars().take(32).collect();
                    write!(f, "\"{}…\"", head)
                } else {
                    write!(f, "{:?}", s)
                }
            }
            Message::Int(n) => write!(f, "{}", n),
            Message::Data(d) => write!(f, "<{} bytes>", d.len()),
            Message::Tuple(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            Message::Empty => write!(f, "()"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_converts_to_atom() {
        let m: Message = "data".into();
        assert_eq!(m, Message::atom("data"));
        assert!(m.is_atom("data"));
        assert!(!m.is_atom("other"));
    }

    #[test]
    fn test_tag_of_tuple() {
        let m = Message::tuple([Message::atom("job"), Message::Int(7)]);
        assert_eq!(m.tag(), Some("job"));
        assert_eq!(Message::Int(3).tag(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Message::atom("tick").to_string(), ":tick");
        assert_eq!(Message::tuple([Message::atom("n"), Message::Int(1)]).to_string(), "{:n, 1}");
        assert_eq!(Message::Data(vec![1, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(Message::Empty.to_string(), "()");
    }

    #[test]
    fn test_long_text_is_truncated() {
        let m = Message::text("x".repeat(40));
        assert!(m.to_string().ends_with("…\""));
    }

    #[test]
    fn test_digest_bytes_distinguish_variants() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        Message::atom("1").digest_bytes(&mut a);
        Message::text("1").digest_bytes(&mut b);
        assert_ne!(a, b);
    }
}

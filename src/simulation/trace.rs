//! Trace — the ordered log of inter-actor messages.

use std::fmt;
use std::sync::Arc;

use crate::message::Message;
use crate::time::VirtualTime;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub(crate) fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Hash a byte slice deterministically (FNV-1a variant).
pub(crate) fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

// ── TraceEvent ────────────────────────────────────────────────────────

/// How a traced message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum TraceKind {
    /// Actor-to-actor message produced by a send pattern or handler.
    Send,
    /// Fire-and-forget message.
    Cast,
    /// Synchronous request.
    Call,
}

impl TraceKind {
    fn code(self) -> u64 {
        match self {
            TraceKind::Send => 0,
            TraceKind::Cast => 1,
            TraceKind::Call => 2,
        }
    }
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceKind::Send => write!(f, "send"),
            TraceKind::Cast => write!(f, "cast"),
            TraceKind::Call => write!(f, "call"),
        }
    }
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEvent {
    /// Virtual time at which the message was sent.
    pub timestamp: VirtualTime,
    /// Sender name (`"driver"` for messages injected by the driver).
    pub from: String,
    /// Receiver name.
    pub to: String,
    /// The message itself.
    pub message: Message,
    /// Send kind.
    pub kind: TraceKind,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {} {} {}",
            self.timestamp, self.from, self.to, self.kind, self.message
        )
    }
}

// ── Trace ─────────────────────────────────────────────────────────────

/// Append-only message log, ordered by timestamp then emission order.
///
/// This is the read-only export consumed by external tooling. Cloning
/// shares the event storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(transparent))]
pub struct Trace {
    events: Arc<Vec<TraceEvent>>,
}

impl Trace {
    pub(crate) fn new(events: Vec<TraceEvent>) -> Self {
        Trace { events: Arc::new(events) }
    }

    pub(crate) fn shared(events: Arc<Vec<TraceEvent>>) -> Self {
        Trace { events }
    }

    /// All events, in order.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over the events.
    pub fn iter(&self) -> std::slice::Iter<'_, TraceEvent> {
        self.events.iter()
    }

    /// Events from `from` to `to`.
    pub fn between<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.events
            .iter()
            .filter(move |e| e.from == from && e.to == to)
    }

    /// Events of one kind.
    pub fn of_kind(&self, kind: TraceKind) -> impl Iterator<Item = &TraceEvent> + '_ {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Messages received by `name`, in order.
    pub fn messages_to<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.events
            .iter()
            .filter(move |e| e.to == name)
            .map(|e| &e.message)
    }

    /// Deterministic hash over the whole ordered trace. Two runs of the
    /// same simulation on a current-thread runtime produce the same
    /// digest.
    pub fn digest(&self) -> u64 {
        let mut h = self.events.len() as u64;
        let mut buf = Vec::new();
        for event in self.events.iter() {
            buf.clear();
            event.message.digest_bytes(&mut buf);
            h = hash_combine(h, event.timestamp.as_millis());
            h = hash_combine(h, hash_bytes(event.from.as_bytes()));
            h = hash_combine(h, hash_bytes(event.to.as_bytes()));
            h = hash_combine(h, event.kind.code());
            h = hash_combine(h, hash_bytes(&buf));
        }
        h
    }

    /// JSON export.
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceEvent;
    type IntoIter = std::slice::Iter<'a, TraceEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in self.events.iter() {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(at: u64, from: &str, to: &str, msg: &str, kind: TraceKind) -> TraceEvent {
        TraceEvent {
            timestamp: VirtualTime::from_millis(at),
            from: from.into(),
            to: to.into(),
            message: Message::atom(msg),
            kind,
        }
    }

    fn sample() -> Trace {
        Trace::new(vec![
            event(100, "producer", "consumer", "data", TraceKind::Send),
            event(100, "driver", "consumer", "poke", TraceKind::Cast),
            event(200, "producer", "consumer", "data", TraceKind::Send),
            event(200, "driver", "producer", "stats", TraceKind::Call),
        ])
    }

    #[test]
    fn test_hash_combine_deterministic() {
        assert_eq!(hash_combine(1, 2), hash_combine(1, 2));
        assert_ne!(hash_combine(1, 2), hash_combine(2, 1));
    }

    #[test]
    fn test_hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn test_filters() {
        let trace = sample();
        assert_eq!(trace.between("producer", "consumer").count(), 2);
        assert_eq!(trace.of_kind(TraceKind::Call).count(), 1);
        let to_consumer: Vec<_> = trace.messages_to("consumer").cloned().collect();
        assert_eq!(
            to_consumer,
            vec![Message::atom("data"), Message::atom("poke"), Message::atom("data")]
        );
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let a = sample();
        assert_eq!(a.digest(), sample().digest());

        let mut events = a.events().to_vec();
        events.swap(0, 1);
        assert_ne!(Trace::new(events).digest(), a.digest());
        assert_ne!(Trace::default().digest(), a.digest());
    }

    #[test]
    fn test_display() {
        let line = event(100, "a", "b", "go", TraceKind::Cast).to_string();
        assert_eq!(line, "[T=100] a -> b cast :go");
    }
}

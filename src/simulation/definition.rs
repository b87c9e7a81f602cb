//! Declarative actor definitions: send patterns, handlers, outcomes.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::backend::TimeBackend;
use crate::error::{SimError, SimResult};
use crate::message::Message;

// ── SendPattern ───────────────────────────────────────────────────────

/// When and how often a simulated actor emits messages on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendPattern {
    /// Send `message` to every target each `interval` ms.
    Periodic { interval: u64, message: Message },
    /// Periodic at `per_second` messages per virtual second.
    Rate { per_second: u64, message: Message },
    /// Every `interval` ms, send `count` copies to each target.
    Burst {
        count: u64,
        interval: u64,
        message: Message,
    },
    /// Deliver `message` to the actor itself once, after `delay` ms.
    SelfMessage { delay: u64, message: Message },
}

impl SendPattern {
    pub fn periodic(interval: u64, message: impl Into<Message>) -> Self {
        SendPattern::Periodic {
            interval,
            message: message.into(),
        }
    }

    pub fn rate(per_second: u64, message: impl Into<Message>) -> Self {
        SendPattern::Rate {
            per_second,
            message: message.into(),
        }
    }

    pub fn burst(count: u64, interval: u64, message: impl Into<Message>) -> Self {
        SendPattern::Burst {
            count,
            interval,
            message: message.into(),
        }
    }

    pub fn self_message(delay: u64, message: impl Into<Message>) -> Self {
        SendPattern::SelfMessage {
            delay,
            message: message.into(),
        }
    }

    /// Delay before the first fire, and between fires for repeating
    /// patterns.
    ///
    /// A rate becomes `max(1, 1000 / per_second)` ms, truncating, so
    /// `rate(3)` fires every 333 ms and anything above 1000/s fires every
    /// millisecond.
    pub fn interval(&self) -> u64 {
        match self {
            SendPattern::Periodic { interval, .. } | SendPattern::Burst { interval, .. } => {
                *interval
            }
            SendPattern::Rate { per_second, .. } => (1000 / (*per_second).max(1)).max(1),
            SendPattern::SelfMessage { delay, .. } => *delay,
        }
    }

    /// The message this pattern emits.
    pub fn message(&self) -> &Message {
        match self {
            SendPattern::Periodic { message, .. }
            | SendPattern::Rate { message, .. }
            | SendPattern::Burst { message, .. }
            | SendPattern::SelfMessage { message, .. } => message,
        }
    }

    /// Returns `true` for patterns that re-arm after each fire.
    pub fn repeats(&self) -> bool {
        !matches!(self, SendPattern::SelfMessage { .. })
    }

    /// Reject patterns that could never advance time.
    ///
    /// Rates above 1000 per second are accepted but capped at one
    /// message per millisecond, with a warning.
    pub fn validate(&self, actor: &str) -> SimResult<()> {
        if let SendPattern::Rate { per_second, .. } = self {
            if *per_second > 1_000 {
                warn!(actor, per_second, "rate above 1000/s is capped at one message per ms");
            }
        }
        let problem = match self {
            SendPattern::Periodic { interval: 0, .. } => "periodic interval must be > 0",
            SendPattern::Burst { interval: 0, .. } => "burst interval must be > 0",
            SendPattern::Rate { per_second: 0, .. } => "rate must be > 0 per second",
            _ => return Ok(()),
        };
        Err(SimError::InvalidConfig(format!("actor `{actor}`: {problem}")))
    }
}

// ── Outcome ───────────────────────────────────────────────────────────

/// What a handler wants done after it updated the state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Nothing further.
    #[default]
    Ok,
    /// Answer the pending call. Only meaningful for calls.
    Reply(Message),
    /// Send each `(target, message)` immediately, in order.
    Send(Vec<(String, Message)>),
}

impl Outcome {
    pub fn reply(message: impl Into<Message>) -> Self {
        Outcome::Reply(message.into())
    }

    /// Send a single message.
    pub fn send(to: impl Into<String>, message: impl Into<Message>) -> Self {
        Outcome::Send(vec![(to.into(), message.into())])
    }

    /// Send several messages.
    pub fn send_all<I, T, M>(sends: I) -> Self
    where
        I: IntoIterator<Item = (T, M)>,
        T: Into<String>,
        M: Into<Message>,
    {
        Outcome::Send(
            sends
                .into_iter()
                .map(|(to, message)| (to.into(), message.into()))
                .collect(),
        )
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

/// A handler over typed state `S`.
pub type Handler<S> = Box<dyn FnMut(&Message, &mut S) -> anyhow::Result<Outcome> + Send>;

/// How an `on_match` rule selects messages.
#[derive(Clone)]
pub enum Matcher {
    /// Exact value equality.
    Exact(Message),
    /// Arbitrary predicate.
    When(Arc<dyn Fn(&Message) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Matcher::Exact(expected) => expected == message,
            Matcher::When(predicate) => predicate(message),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(message) => write!(f, "Exact({message})"),
            Matcher::When(_) => write!(f, "When(..)"),
        }
    }
}

/// Type-erased state plus handlers, run by the simulated actor.
pub(crate) trait Behaviour: Send {
    fn handle(&mut self, message: &Message) -> anyhow::Result<Outcome>;
}

struct TypedBehaviour<S> {
    state: S,
    rules: Vec<(Matcher, Handler<S>)>,
    on_receive: Option<Handler<S>>,
}

impl<S: Send + 'static> Behaviour for TypedBehaviour<S> {
    fn handle(&mut self, message: &Message) -> anyhow::Result<Outcome> {
        for (matcher, handler) in &mut self.rules {
            if matcher.matches(message) {
                return handler(message, &mut self.state);
            }
        }
        match &mut self.on_receive {
            Some(handler) => handler(message, &mut self.state),
            None => Ok(Outcome::Ok),
        }
    }
}

// ── ActorDef ──────────────────────────────────────────────────────────

/// Fluent builder for a simulated actor with state of type `S`.
///
/// # Example
/// ```rust
/// use timewarp::simulation::{ActorDef, Outcome, SendPattern};
///
/// let producer = ActorDef::new("producer")
///     .send_pattern(SendPattern::periodic(100, "data"))
///     .targets(["consumer"]);
///
/// let consumer = ActorDef::new("consumer")
///     .initial_state(0u64)
///     .on_receive(|_msg, count| {
///         *count += 1;
///         Outcome::Ok
///     });
/// ```
pub struct ActorDef<S = ()> {
    name: String,
    pattern: Option<SendPattern>,
    targets: Vec<String>,
    state: S,
    rules: Vec<(Matcher, Handler<S>)>,
    on_receive: Option<Handler<S>>,
    backend: Option<Arc<dyn TimeBackend>>,
}

impl ActorDef<()> {
    /// Start a definition with unit state.
    pub fn new(name: impl Into<String>) -> Self {
        ActorDef {
            name: name.into(),
            pattern: None,
            targets: Vec::new(),
            state: (),
            rules: Vec::new(),
            on_receive: None,
            backend: None,
        }
    }
}

impl<S: Send + 'static> ActorDef<S> {
    /// Replace the state. Handlers are typed over the state, so this
    /// must come before any `on_receive`/`on_match`; earlier handlers
    /// are discarded.
    pub fn initial_state<T: Send + 'static>(self, state: T) -> ActorDef<T> {
        ActorDef {
            name: self.name,
            pattern: self.pattern,
            targets: self.targets,
            state,
            rules: Vec::new(),
            on_receive: None,
            backend: self.backend,
        }
    }

    pub fn send_pattern(mut self, pattern: SendPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Append targets, in order.
    pub fn targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Fallback handler for messages no rule matched.
    pub fn on_receive<F>(mut self, mut handler: F) -> Self
    where
        F: FnMut(&Message, &mut S) -> Outcome + Send + 'static,
    {
        self.on_receive = Some(Box::new(move |msg, state| Ok(handler(msg, state))));
        self
    }

    /// Fallible fallback handler; an `Err` fails the actor.
    pub fn try_on_receive<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Message, &mut S) -> anyhow::Result<Outcome> + Send + 'static,
    {
        self.on_receive = Some(Box::new(handler));
        self
    }

    /// Rule for messages equal to `message`. Rules are tried in the
    /// order they were added.
    pub fn on_match<F>(self, message: impl Into<Message>, handler: F) -> Self
    where
        F: FnMut(&Message, &mut S) -> Outcome + Send + 'static,
    {
        self.rule(Matcher::Exact(message.into()), handler)
    }

    /// Rule for messages satisfying `predicate`.
    pub fn on_match_when<P, F>(self, predicate: P, handler: F) -> Self
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
        F: FnMut(&Message, &mut S) -> Outcome + Send + 'static,
    {
        self.rule(Matcher::When(Arc::new(predicate)), handler)
    }

    /// Rule with an explicit matcher.
    pub fn rule<F>(mut self, matcher: Matcher, mut handler: F) -> Self
    where
        F: FnMut(&Message, &mut S) -> Outcome + Send + 'static,
    {
        self.rules
            .push((matcher, Box::new(move |msg, state| Ok(handler(msg, state)))));
        self
    }

    /// Run this actor on `backend` instead of the simulation's clock.
    pub fn backend(mut self, backend: Arc<dyn TimeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }
}

// ── ActorDefinition ───────────────────────────────────────────────────

/// A finished, type-erased actor definition. Immutable once added to a
/// simulation.
pub struct ActorDefinition {
    pub(crate) name: String,
    pub(crate) pattern: Option<SendPattern>,
    pub(crate) targets: Vec<String>,
    pub(crate) behaviour: Box<dyn Behaviour>,
    pub(crate) backend: Option<Arc<dyn TimeBackend>>,
}

impl ActorDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> Option<&SendPattern> {
        self.pattern.as_ref()
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

impl<S: Send + 'static> From<ActorDef<S>> for ActorDefinition {
    fn from(def: ActorDef<S>) -> Self {
        ActorDefinition {
            name: def.name,
            pattern: def.pattern,
            targets: def.targets,
            behaviour: Box::new(TypedBehaviour {
                state: def.state,
                rules: def.rules,
                on_receive: def.on_receive,
            }),
            backend: def.backend,
        }
    }
}

impl fmt::Debug for ActorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorDefinition")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("targets", &self.targets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_rate_interval_truncates() {
        assert_eq!(SendPattern::rate(10, "x").interval(), 100);
        assert_eq!(SendPattern::rate(3, "x").interval(), 333);
        assert_eq!(SendPattern::rate(7, "x").interval(), 142);
        assert_eq!(SendPattern::rate(1_000, "x").interval(), 1);
        assert_eq!(SendPattern::rate(5_000, "x").interval(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(SendPattern::periodic(0, "x").validate("a").is_err());
        assert!(SendPattern::burst(3, 0, "x").validate("a").is_err());
        let err = SendPattern::rate(0, "x").validate("a").unwrap_err();
        assert!(err.is_config_error());
        assert!(SendPattern::self_message(0, "x").validate("a").is_ok());
        assert!(SendPattern::periodic(1, "x").validate("a").is_ok());
    }

    #[test]
    #[traced_test]
    fn test_rate_above_millisecond_resolution_warns() {
        let pattern = SendPattern::rate(5_000, "x");
        assert!(pattern.validate("fast").is_ok());
        assert_eq!(pattern.interval(), 1);
        assert!(logs_contain("capped at one message per ms"));
    }

    #[test]
    #[traced_test]
    fn test_rate_within_resolution_is_silent() {
        assert!(SendPattern::rate(1_000, "x").validate("steady").is_ok());
        assert!(!logs_contain("capped"));
    }

    #[test]
    fn test_self_message_does_not_repeat() {
        assert!(!SendPattern::self_message(5, "done").repeats());
        assert!(SendPattern::burst(1, 5, "b").repeats());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let def: ActorDefinition = ActorDef::new("a")
            .initial_state(Vec::<&'static str>::new())
            .on_match_when(|m| m.tag() == Some("job"), |_, log| {
                log.push("predicate");
                Outcome::reply("p")
            })
            .on_match(Message::tuple([Message::atom("job"), Message::Int(1)]), |_, log| {
                log.push("exact");
                Outcome::reply("e")
            })
            .on_receive(|_, log| {
                log.push("fallback");
                Outcome::Ok
            })
            .into();
        let mut behaviour = def.behaviour;

        let job = Message::tuple([Message::atom("job"), Message::Int(1)]);
        assert_eq!(behaviour.handle(&job).unwrap(), Outcome::reply("p"));
        assert_eq!(behaviour.handle(&Message::atom("other")).unwrap(), Outcome::Ok);
    }

    #[test]
    fn test_no_handlers_is_noop() {
        let def: ActorDefinition = ActorDef::new("idle").into();
        let mut behaviour = def.behaviour;
        assert_eq!(behaviour.handle(&Message::atom("x")).unwrap(), Outcome::Ok);
    }

    #[test]
    fn test_builder_fields() {
        let def: ActorDefinition = ActorDef::new("producer")
            .send_pattern(SendPattern::periodic(100, "data"))
            .targets(["a", "b"])
            .target("c")
            .into();
        assert_eq!(def.name(), "producer");
        assert_eq!(def.targets(), ["a", "b", "c"]);
        assert_eq!(def.pattern().map(SendPattern::interval), Some(100));
    }

    #[test]
    fn test_outcome_helpers() {
        assert_eq!(
            Outcome::send_all([("a", "x"), ("b", "y")]),
            Outcome::Send(vec![
                ("a".to_string(), Message::atom("x")),
                ("b".to_string(), Message::atom("y")),
            ])
        );
        assert_eq!(Outcome::default(), Outcome::Ok);
    }
}

//! State machine definition types.
//!
//! Machine definitions use a JSON DSL:
//!
//! ```json
//! {
//!   "events": ["button_push", "countdown_complete"],
//!   "initial": "start",
//!   "states": {
//!     "start": { "tran": { "auto": { "dest": "idle" } } },
//!     "idle": {
//!       "entry": ["set_light(red)"],
//!       "tran": { "button_push": { "acts": ["start_countdown(5)"], "dest": "waiting" } }
//!     },
//!     "waiting": { "tran": { "countdown_complete": { "dest": "idle" } } }
//!   }
//! }
//! ```
//!
//! `initial` defaults to `"start"`. The reserved `auto` event marks the
//! transition taken unconditionally when a machine is constructed.

use crate::error::DefinitionError;
use crate::validate;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Pseudo-event naming the unconditional bootstrap transition.
pub const AUTO_EVENT: &str = "auto";

/// Start state used when a definition does not name one.
pub const DEFAULT_START_STATE: &str = "start";

fn default_initial() -> String {
    DEFAULT_START_STATE.to_string()
}

/// Raw machine definition as written by the author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineDefinitionRaw {
    /// Declared event names.
    pub events: Vec<String>,

    /// Start state.
    #[serde(default = "default_initial")]
    pub initial: String,

    /// States by name.
    #[serde(deserialize_with = "unique_states")]
    pub states: BTreeMap<String, StateDefRaw>,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Raw state as written by the author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateDefRaw {
    /// Actions run every time the state is entered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<String>,

    /// Transitions keyed by triggering event.
    #[serde(
        default,
        deserialize_with = "unique_transitions",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub tran: BTreeMap<String, TransitionDefRaw>,
}

/// Raw transition as written by the author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDefRaw {
    /// Actions run before the state changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acts: Vec<String>,

    /// Destination state.
    pub dest: String,
}

/// Builds a map from a JSON object, failing on the first repeated key
/// instead of letting the last occurrence win.
struct UniqueKeys<V> {
    kind: &'static str,
    marker: PhantomData<V>,
}

impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueKeys<V> {
    type Value = BTreeMap<String, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a map of {}s", self.kind)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some(key) = access.next_key::<String>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format_args!(
                    "duplicate {} '{}'",
                    self.kind, key
                )));
            }
            let value = access.next_value()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

fn unique_keys<'de, D, V>(
    deserializer: D,
    kind: &'static str,
) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    deserializer.deserialize_map(UniqueKeys {
        kind,
        marker: PhantomData,
    })
}

fn unique_states<'de, D>(deserializer: D) -> Result<BTreeMap<String, StateDefRaw>, D::Error>
where
    D: Deserializer<'de>,
{
    unique_keys(deserializer, "state")
}

fn unique_transitions<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, TransitionDefRaw>, D::Error>
where
    D: Deserializer<'de>,
{
    unique_keys(deserializer, "transition event")
}

/// A parsed action call such as `start_countdown(5)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionRef {
    name: String,
    arg: Option<String>,
}

impl ActionRef {
    pub fn new(name: impl Into<String>, arg: Option<String>) -> Self {
        Self {
            name: name.into(),
            arg,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }
}

impl FromStr for ActionRef {
    type Err = DefinitionError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DefinitionError::InvalidAction {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = spec.trim();
        let (name, arg) = match trimmed.find('(') {
            None => (trimmed, None),
            Some(open) => {
                let inner = trimmed[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("missing closing ')'"))?
                    .trim();
                if inner.contains(['(', ')']) {
                    return Err(invalid("parentheses are not allowed in the argument"));
                }
                let arg = (!inner.is_empty()).then(|| inner.to_string());
                (trimmed[..open].trim_end(), arg)
            }
        };

        if !is_identifier(name) {
            return Err(invalid("action name must be an identifier"));
        }

        Ok(Self::new(name, arg))
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arg.as_deref().unwrap_or(""))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn parse_actions(specs: &[String]) -> Result<Vec<ActionRef>, DefinitionError> {
    specs.iter().map(|s| s.parse()).collect()
}

/// A validated transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDef {
    /// Destination state.
    pub dest: String,
    /// Actions run, in order, before the state changes.
    pub actions: Vec<ActionRef>,
}

/// A validated state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDef {
    /// Actions run, in order, each time the state is entered.
    pub entry: Vec<ActionRef>,
    transitions: HashMap<String, TransitionDef>,
}

impl StateDef {
    /// Looks up the transition for an event.
    pub fn transition(&self, event: &str) -> Option<&TransitionDef> {
        self.transitions.get(event)
    }
}

/// Validated and indexed machine definition.
#[derive(Debug, Clone)]
pub struct MachineDefinition {
    /// Declared events.
    pub events: HashSet<String>,

    /// Start state.
    pub initial: String,

    states: HashMap<String, StateDef>,

    /// Original raw definition.
    pub raw: MachineDefinitionRaw,

    /// Hash of the definition for integrity checks.
    pub checksum: String,
}

impl MachineDefinition {
    /// Parses and validates a machine definition from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, DefinitionError> {
        let raw: MachineDefinitionRaw = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Parses and validates a machine definition from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, DefinitionError> {
        let raw: MachineDefinitionRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(raw)
    }

    /// Creates a machine definition from raw parts.
    pub fn from_raw(raw: MachineDefinitionRaw) -> Result<Self, DefinitionError> {
        validate::validate(&raw)?;

        let mut states = HashMap::with_capacity(raw.states.len());
        for (name, state_raw) in &raw.states {
            let entry = parse_actions(&state_raw.entry)?;
            let mut transitions = HashMap::with_capacity(state_raw.tran.len());
            for (event, t) in &state_raw.tran {
                let actions = parse_actions(&t.acts)?;
                tracing::debug!(
                    state = %name,
                    event = %event,
                    dest = %t.dest,
                    actions = actions.len(),
                    "parsed transition"
                );
                transitions.insert(
                    event.clone(),
                    TransitionDef {
                        dest: t.dest.clone(),
                        actions,
                    },
                );
            }
            tracing::debug!(state = %name, entry_actions = entry.len(), "parsed state");
            states.insert(name.clone(), StateDef { entry, transitions });
        }

        let json_bytes = serde_json::to_vec(&raw)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            events: raw.events.iter().cloned().collect(),
            initial: raw.initial.clone(),
            states,
            raw,
            checksum,
        })
    }

    /// Returns the state with the given name.
    pub fn state(&self, name: &str) -> Option<&StateDef> {
        self.states.get(name)
    }

    /// Returns true if the given state is declared.
    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Returns true if the given event is declared.
    pub fn has_event(&self, event: &str) -> bool {
        self.events.contains(event)
    }

    /// Looks up a transition for the given state and event.
    pub fn transition(&self, state: &str, event: &str) -> Option<&TransitionDef> {
        self.states.get(state)?.transition(event)
    }

    /// The start state's bootstrap transition.
    pub fn auto_transition(&self) -> Option<&TransitionDef> {
        self.transition(&self.initial, AUTO_EVENT)
    }

    /// Returns all events handled in the given state, sorted.
    pub fn events_from(&self, state: &str) -> Vec<&str> {
        let mut events: Vec<&str> = self
            .states
            .get(state)
            .map(|s| s.transitions.keys().map(String::as_str).collect())
            .unwrap_or_default();
        events.sort_unstable();
        events
    }

    /// Names of all states, sorted.
    pub fn state_names(&self) -> Vec<&str> {
        self.raw.states.keys().map(String::as_str).collect()
    }

    /// Every action name the definition refers to.
    pub fn referenced_actions(&self) -> BTreeSet<&str> {
        self.states
            .values()
            .flat_map(|s| {
                s.entry
                    .iter()
                    .chain(s.transitions.values().flat_map(|t| t.actions.iter()))
            })
            .map(ActionRef::name)
            .collect()
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.raw)
    }
}

//! Referential integrity checks for machine definitions.
//!
//! Validation runs once, before a definition is indexed. Action names are
//! not resolved here: the host registry is only consulted when a machine is
//! constructed (see [`unresolved_actions`]) and again at call time.

use crate::definition::{MachineDefinition, MachineDefinitionRaw, AUTO_EVENT};
use crate::error::DefinitionError;
use std::collections::HashSet;

/// Checks a raw definition for structural and referential errors.
pub fn validate(raw: &MachineDefinitionRaw) -> Result<(), DefinitionError> {
    let mut events = HashSet::with_capacity(raw.events.len());
    for event in &raw.events {
        if event == AUTO_EVENT {
            return Err(DefinitionError::ReservedEvent {
                event: event.clone(),
            });
        }
        if !events.insert(event.as_str()) {
            return Err(DefinitionError::DuplicateEvent {
                event: event.clone(),
            });
        }
    }

    let start = raw
        .states
        .get(&raw.initial)
        .ok_or_else(|| DefinitionError::MissingStartState {
            state: raw.initial.clone(),
        })?;
    if !start.tran.contains_key(AUTO_EVENT) {
        return Err(DefinitionError::MissingAutoTransition {
            state: raw.initial.clone(),
        });
    }

    for (state, def) in &raw.states {
        for (event, transition) in &def.tran {
            if event == AUTO_EVENT {
                if *state != raw.initial {
                    return Err(DefinitionError::MisplacedAutoTransition {
                        state: state.clone(),
                    });
                }
            } else if !events.contains(event.as_str()) {
                return Err(DefinitionError::UndeclaredEvent {
                    state: state.clone(),
                    event: event.clone(),
                });
            }

            if !raw.states.contains_key(&transition.dest) {
                return Err(DefinitionError::UnknownDestination {
                    state: state.clone(),
                    event: event.clone(),
                    dest: transition.dest.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Returns the action names the definition references that `is_registered`
/// does not know about, sorted.
pub fn unresolved_actions(
    definition: &MachineDefinition,
    is_registered: impl Fn(&str) -> bool,
) -> Vec<String> {
    definition
        .referenced_actions()
        .into_iter()
        .filter(|name| !is_registered(name))
        .map(str::to_string)
        .collect()
}

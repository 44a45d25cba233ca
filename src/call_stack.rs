//! In-flight call stacks built from matched enter/exit events
//!
//! A stack only ever changes through a matching pair: an exit whose label
//! is not the current top (or arrives on an empty stack) is rejected and
//! the stack is left exactly as it was.
//!
//! By default one stack exists per region name, shared by every unit whose
//! events fall into that region ([`StackScope::Shared`]). Two units active
//! in the same region at once then interleave into one stack and must nest
//! as a single sequence. [`StackScope::PerUnit`] gives each (region, unit)
//! pair its own stack instead. Trees stay per region name in both modes.

use crate::event::{Direction, TraceEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// How call stacks are partitioned within a region
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StackScope {
    /// One stack per region name, shared across units
    #[default]
    Shared,
    /// One stack per (region name, unit)
    PerUnit,
}

/// A call between its enter event and its matching exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub label: String,
    pub entered_at: i64,
}

/// A popped call, ready to be folded into a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCall {
    /// Labels from the outermost frame to the one that exited, inclusive
    pub path: Vec<String>,
    /// Exit timestamp minus entry timestamp
    pub duration: i64,
}

/// Why an exit event could not be matched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackMismatch {
    #[error("exit of \"{label}\" with no call in flight")]
    Empty { label: String },

    #[error("exit of \"{label}\" while \"{top}\" is on top of the stack")]
    Label { label: String, top: String },

    #[error("exit of \"{label}\" at {exited_at} overflows its duration (entered at {entered_at})")]
    DurationOverflow {
        label: String,
        entered_at: i64,
        exited_at: i64,
    },
}

/// Frames left on a stack when ingestion ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclosedStack {
    pub region: String,
    /// Set only under [`StackScope::PerUnit`]
    pub unit: Option<String>,
    pub frames: Vec<Frame>,
}

type StackKey = (String, Option<String>);

/// Per-region call stacks, owned by the ingestion thread
#[derive(Debug, Default)]
pub struct CallStackTracker {
    scope: StackScope,
    stacks: HashMap<StackKey, Vec<Frame>>,
}

impl CallStackTracker {
    pub fn new(scope: StackScope) -> Self {
        Self {
            scope,
            stacks: HashMap::new(),
        }
    }

    pub fn scope(&self) -> StackScope {
        self.scope
    }

    fn key(&self, region: &str, unit: &str) -> StackKey {
        match self.scope {
            StackScope::Shared => (region.to_string(), None),
            StackScope::PerUnit => (region.to_string(), Some(unit.to_string())),
        }
    }

    /// Push a frame for `label` onto the stack selected by `region`/`unit`
    pub fn enter(&mut self, region: &str, unit: &str, label: &str, timestamp: i64) {
        let key = self.key(region, unit);
        self.stacks.entry(key).or_default().push(Frame {
            label: label.to_string(),
            entered_at: timestamp,
        });
    }

    /// Pop the top frame if its label is `label`
    ///
    /// The returned path is the stack as it stood before the pop. An exit
    /// whose duration does not fit in an `i64` is rejected like a label
    /// mismatch, leaving the frame in place.
    pub fn exit(
        &mut self,
        region: &str,
        unit: &str,
        label: &str,
        timestamp: i64,
    ) -> Result<CompletedCall, StackMismatch> {
        let key = self.key(region, unit);
        let stack = match self.stacks.get_mut(&key) {
            Some(stack) if !stack.is_empty() => stack,
            _ => {
                return Err(StackMismatch::Empty {
                    label: label.to_string(),
                })
            }
        };

        // Non-empty was checked above
        let top = &stack[stack.len() - 1];
        if top.label != label {
            return Err(StackMismatch::Label {
                label: label.to_string(),
                top: top.label.clone(),
            });
        }

        let Some(duration) = timestamp.checked_sub(top.entered_at) else {
            return Err(StackMismatch::DurationOverflow {
                label: label.to_string(),
                entered_at: top.entered_at,
                exited_at: timestamp,
            });
        };

        let path = stack.iter().map(|frame| frame.label.clone()).collect();
        stack.pop();

        Ok(CompletedCall { path, duration })
    }

    /// Apply one event to `region`'s stack
    ///
    /// Returns the completed call for a matched exit, `None` for an enter.
    pub fn apply(
        &mut self,
        region: &str,
        event: &TraceEvent,
    ) -> Result<Option<CompletedCall>, StackMismatch> {
        match event.direction {
            Direction::Enter => {
                self.enter(region, &event.unit, &event.label, event.timestamp);
                Ok(None)
            }
            Direction::Exit => self
                .exit(region, &event.unit, &event.label, event.timestamp)
                .map(Some),
        }
    }

    /// Current depth of the stack selected by `region`/`unit`
    pub fn depth(&self, region: &str, unit: &str) -> usize {
        self.stacks
            .get(&self.key(region, unit))
            .map_or(0, Vec::len)
    }

    /// Stacks that still hold frames, ordered by region then unit
    pub fn unclosed(&self) -> Vec<UnclosedStack> {
        let mut unclosed: Vec<UnclosedStack> = self
            .stacks
            .iter()
            .filter(|(_, frames)| !frames.is_empty())
            .map(|((region, unit), frames)| UnclosedStack {
                region: region.clone(),
                unit: unit.clone(),
                frames: frames.clone(),
            })
            .collect();
        unclosed.sort_by(|a, b| (&a.region, &a.unit).cmp(&(&b.region, &b.unit)));
        unclosed
    }
}

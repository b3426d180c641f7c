//! Host events and the label slots they fire.
//!
//! The [`Host`](crate::host::Host) queues an [`Event`] whenever a variable or
//! result changes.  A proxy object that a script bound to that entity keeps
//! one instruction pointer per [`Hook`]; when the slot is armed (positive) the
//! interpreter calls the label there.

// ── Event ─────────────────────────────────────────────────────────────────────

/// Something that happened to a host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Current value of a variable.
    ValueChange,
    /// Current flags of a variable.
    FlagsChange,
    /// The entity was defined, redefined or relinked.
    IdChanged,
    /// Accessible block range of a result.
    AccessChange,
    /// Result data is about to be cleared.
    Clear,
    /// A requested result range has arrived.
    GotRange,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::ValueChange => "ValueChange",
            Event::FlagsChange => "FlagsChange",
            Event::IdChanged => "IdChanged",
            Event::AccessChange => "AccessChange",
            Event::Clear => "Clear",
            Event::GotRange => "GotRange",
        }
    }

    /// Slot a `Variable`/`VarParam` proxy fires.
    pub fn variable_hook(self) -> Option<Hook> {
        Some(match self {
            Event::ValueChange => Hook::Value,
            Event::FlagsChange => Hook::Flags,
            Event::IdChanged => Hook::Id,
            Event::AccessChange | Event::Clear | Event::GotRange => return None,
        })
    }

    /// Slot a `ResultData` proxy fires.
    pub fn result_hook(self) -> Option<Hook> {
        Some(match self {
            Event::IdChanged => Hook::Id,
            Event::AccessChange => Hook::Access,
            Event::Clear => Hook::Clear,
            Event::GotRange => Hook::GotRange,
            Event::ValueChange | Event::FlagsChange => return None,
        })
    }
}

// ── Hook slots ────────────────────────────────────────────────────────────────

/// `On*` member of a proxy; the discriminant indexes [`HookSlots`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Value,
    Flags,
    Id,
    Access,
    Clear,
    GotRange,
}

const SLOTS: usize = Hook::GotRange as usize + 1;

/// Label instruction pointers, one per [`Hook`].  Zero or negative is
/// disarmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSlots([isize; SLOTS]);

impl HookSlots {
    pub fn get(&self, hook: Hook) -> isize {
        self.0[hook as usize]
    }

    pub fn set(&mut self, hook: Hook, ip: isize) {
        self.0[hook as usize] = ip;
    }

    pub fn armed(&self, hook: Hook) -> Option<isize> {
        Some(self.get(hook)).filter(|&ip| ip > 0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_and_result_events_use_their_own_slots() {
        assert_eq!(Event::ValueChange.variable_hook(), Some(Hook::Value));
        assert_eq!(Event::ValueChange.result_hook(), None);
        assert_eq!(Event::GotRange.variable_hook(), None);
        assert_eq!(Event::GotRange.result_hook(), Some(Hook::GotRange));
        assert_eq!(Event::Clear.result_hook(), Some(Hook::Clear));
        assert_eq!(Event::IdChanged.variable_hook(), Some(Hook::Id));
        assert_eq!(Event::IdChanged.result_hook(), Some(Hook::Id));
    }

    #[test]
    fn clear_and_got_range_do_not_alias() {
        let mut slots = HookSlots::default();
        slots.set(Hook::Clear, 4);
        slots.set(Hook::GotRange, 9);
        assert_eq!(slots.get(Hook::Clear), 4);
        assert_eq!(slots.armed(Hook::GotRange), Some(9));
        assert_eq!(slots.armed(Hook::Access), None);
    }

    #[test]
    fn non_positive_slot_is_disarmed() {
        let mut slots = HookSlots::default();
        slots.set(Hook::Value, -1);
        assert_eq!(slots.armed(Hook::Value), None);
        slots.set(Hook::Value, 0);
        assert_eq!(slots.armed(Hook::Value), None);
    }
}

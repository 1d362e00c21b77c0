//! Trigger policies: should a visited cell re-evaluate and re-notify?

use std::fmt;
use std::rc::Rc;

/// Structural-conformance seam for custom trigger policies.
pub trait FireGate {
    /// `changed` is the hint carried by the pulse: did the notifying cell's
    /// value actually change?
    fn should_fire(&self, changed: bool) -> bool;
}

#[derive(Clone, Default)]
pub enum TriggerPolicy {
    /// Notify downstream on every visit.
    #[default]
    Always,

    /// Notify downstream only when the incoming value changed.
    OnChange,

    /// Notify only when the predicate holds. The predicate may read any
    /// cells; those reads do not register as dependencies.
    Threshold(Rc<dyn Fn() -> bool>),

    Custom(Rc<dyn FireGate>),
}

impl TriggerPolicy {
    /// Wrap a predicate closure into a Threshold policy.
    pub fn threshold(pred: impl Fn() -> bool + 'static) -> Self {
        TriggerPolicy::Threshold(Rc::new(pred))
    }

    pub(crate) fn should_fire(&self, changed: bool) -> bool {
        match self {
            TriggerPolicy::Always => true,
            TriggerPolicy::OnChange => changed,
            TriggerPolicy::Threshold(pred) => pred(),
            TriggerPolicy::Custom(gate) => gate.should_fire(changed),
        }
    }
}

impl fmt::Debug for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerPolicy::Always => f.write_str("Always"),
            TriggerPolicy::OnChange => f.write_str("OnChange"),
            TriggerPolicy::Threshold(_) => f.write_str("Threshold(..)"),
            TriggerPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EveryOther(std::cell::Cell<bool>);

    impl FireGate for EveryOther {
        fn should_fire(&self, _changed: bool) -> bool {
            let fire = !self.0.get();
            self.0.set(fire);
            fire
        }
    }

    #[test]
    fn builtin_policies() {
        assert!(TriggerPolicy::Always.should_fire(false));
        assert!(TriggerPolicy::OnChange.should_fire(true));
        assert!(!TriggerPolicy::OnChange.should_fire(false));
        assert!(TriggerPolicy::threshold(|| true).should_fire(false));
        assert!(!TriggerPolicy::threshold(|| false).should_fire(true));
    }

    #[test]
    fn custom_gate_is_consulted() {
        let policy = TriggerPolicy::Custom(Rc::new(EveryOther(std::cell::Cell::new(true))));
        assert!(!policy.should_fire(true));
        assert!(policy.should_fire(true));
    }
}

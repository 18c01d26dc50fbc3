/// Execution state of the external CPU as the adapter tracks it. The raw
/// value is what GET_STATUS puts on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle = 0,
    Running = 1,
    /// Representable but unreachable: nothing in the current command set or
    /// bus logic transitions here. Presumably meant for a /HALT-line
    /// assertion; left unwired until that trigger is confirmed.
    Halted = 2,
}

impl ExecutionState {
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_running(self) -> bool {
        matches!(self, ExecutionState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionState;

    #[test]
    fn starts_idle() {
        assert_eq!(ExecutionState::default(), ExecutionState::Idle);
    }

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(ExecutionState::Idle.as_byte(), 0);
        assert_eq!(ExecutionState::Running.as_byte(), 1);
        assert_eq!(ExecutionState::Halted.as_byte(), 2);
    }
}
